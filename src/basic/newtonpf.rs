use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use tracing::{debug, warn};

use super::dsbus_dv::dSbus_dV;
use super::island::{Island, IslandScenario};
use super::network::BusKind;
use super::pf::{PowerFlowOptions, SolveResult, SolveStatus};
use super::solver::Solve;
use super::sparse::{RealImage, csc_hstack, csc_vstack, select};
use super::system::flows::{FlowModel, bus_injections};

/// Polar Newton-Raphson for an AC island with slack and fixed-power buses.
///
/// Every non-slack bus is treated as PQ: its angle and magnitude are the
/// unknowns. Convergence and iteration counting follow
/// [`dc_newton`](super::dcnewton::dc_newton): the loop stops once the largest
/// correction drops below `options.tol` or after `options.max_iter` linear
/// solves.
#[allow(non_snake_case)]
pub fn ac_newton<S: Solve>(
    island: &Island,
    scenario: &IslandScenario,
    v_init: &DVector<Complex64>,
    options: &PowerFlowOptions,
    solver: &mut S,
) -> SolveResult {
    let Ybus = &island.y_bus;
    let Sbus = &scenario.s_bus;
    let pq = &island.sets.non_slack;
    let npq = pq.len();

    let mut v = v_init.clone();
    let mut v_m = v.map(|e| e.norm());
    let mut v_a = v.map(|e| e.arg());

    let mut status = if npq == 0 {
        SolveStatus::Converged
    } else {
        SolveStatus::NotConverged
    };
    let mut iterations = 0;

    while status == SolveStatus::NotConverged && iterations < options.max_iter {
        let v_norm = v.map(|e| e / e.norm());
        let mis = &v.component_mul(&(Ybus * &v).conjugate()) - Sbus;
        let mut F: Vec<f64> = pq
            .iter()
            .map(|&k| mis[k].re)
            .chain(pq.iter().map(|&k| mis[k].im))
            .collect();

        let (dS_dVm, dS_dVa) = dSbus_dV(Ybus, &v, &v_norm);
        let jacobian = build_jacobian(&dS_dVm, &dS_dVa, pq);

        iterations += 1;
        if let Err(err) = solver.solve_csc(&jacobian, &mut F) {
            warn!(island = island.index, scenario = scenario.index, %err, "singular AC Jacobian");
            status = SolveStatus::SingularSystem;
            break;
        }

        let (d_va, d_vm) = F.split_at(npq);
        for (r, &k) in pq.iter().enumerate() {
            v_a[k] -= d_va[r];
            v_m[k] -= d_vm[r];
        }
        v.iter_mut()
            .zip(v_m.iter().zip(v_a.iter()))
            .for_each(|(e, (&m, &a))| *e = Complex64::from_polar(m, a));

        if F.iter().fold(0.0f64, |acc, x| acc.max(x.abs())) < options.tol {
            status = SolveStatus::Converged;
        }
    }

    if status == SolveStatus::NotConverged {
        debug!(
            island = island.index,
            scenario = scenario.index,
            iterations,
            "AC power flow did not converge"
        );
    }

    let calc = bus_injections(Ybus, &v, FlowModel::Ac);
    let s_bus = DVector::from_fn(v.len(), |k, _| match island.kinds[k] {
        BusKind::Slack { .. } => calc[k],
        _ => Sbus[k],
    });
    SolveResult::from_state(island, status, iterations, v, s_bus, FlowModel::Ac)
}

/// `[[Re dS/dVa, Re dS/dVm], [Im dS/dVa, Im dS/dVm]]` restricted to the PQ buses.
#[allow(non_snake_case)]
#[inline(always)]
fn build_jacobian(
    ds_dvm: &CscMatrix<Complex64>,
    ds_dva: &CscMatrix<Complex64>,
    pq: &[usize],
) -> CscMatrix<f64> {
    let dva = select(ds_dva, pq, pq);
    let dvm = select(ds_dvm, pq, pq);
    let J11 = dva.real();
    let J12 = dvm.real();
    let J21 = dva.imag();
    let J22 = dvm.imag();
    csc_vstack(&[&csc_hstack(&[&J11, &J12]), &csc_hstack(&[&J21, &J22])])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::island::IslandPartitioner;
    use crate::basic::network::{Branch, Bus, NetworkModel};
    use crate::basic::pf::SolverKind;
    use crate::basic::solver::DefaultSolver;
    use crate::timeseries::Scenario;

    fn three_bus() -> NetworkModel {
        let mut net = NetworkModel::new(100.0);
        net.add_bus(Bus::slack("s", 1.0));
        net.add_bus(Bus::fixed("a", Complex64::new(-0.5, -0.2)));
        net.add_bus(Bus::fixed("b", Complex64::new(-0.3, -0.1)));
        net.add_branch(Branch::from_impedance("sa", 0, 1, 0.01, 0.1).with_shunt(Complex64::new(0.0, 0.02)));
        net.add_branch(Branch::from_impedance("ab", 1, 2, 0.02, 0.08));
        net.add_branch(Branch::from_impedance("sb", 0, 2, 0.015, 0.12));
        net
    }

    fn options() -> PowerFlowOptions {
        PowerFlowOptions {
            solver: SolverKind::AcNewton,
            ..Default::default()
        }
    }

    #[test]
    fn ac_three_bus_balances_power() {
        let net = three_bus();
        let islands = IslandPartitioner::default().partition(&net).unwrap();
        let scenario = islands[0].localize(&Scenario::base(&net));
        let v0 = islands[0].initial_voltage(&scenario);
        let res = ac_newton(&islands[0], &scenario, &v0, &options(), &mut DefaultSolver::default());
        assert!(res.converged());
        assert!(res.iterations < 10);
        let injected: Complex64 = res.s_bus.iter().sum();
        let lost: Complex64 = res.losses.iter().sum();
        assert!((injected - lost).norm() < 1e-7);
        assert!(res.voltage[1].norm() < 1.0);
    }

    #[test]
    fn ac_slack_only_island_is_trivially_solved() {
        let mut net = NetworkModel::new(100.0);
        net.add_bus(Bus::slack("s", 1.01));
        let islands = IslandPartitioner::default().partition(&net).unwrap();
        let scenario = islands[0].localize(&Scenario::base(&net));
        let v0 = islands[0].initial_voltage(&scenario);
        let res = ac_newton(&islands[0], &scenario, &v0, &options(), &mut DefaultSolver::default());
        assert!(res.converged());
        assert_eq!(res.iterations, 0);
        assert!((res.voltage[0].re - 1.01).abs() < 1e-12);
    }
}
