use std::fmt;

use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::results::GlobalResultSet;

/// A float that prints with a fixed number of decimal places.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct FloatWrapper {
    pub(crate) value: f64,
    pub(crate) precision: usize,
}

impl FloatWrapper {
    pub fn new(value: f64, precision: usize) -> Self {
        FloatWrapper { value, precision }
    }
}

impl Default for FloatWrapper {
    fn default() -> Self {
        Self {
            value: Default::default(),
            precision: 3,
        }
    }
}

impl fmt::Display for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

impl fmt::Debug for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

#[derive(Debug, Tabled)]
struct BusResTable {
    bus: usize,
    vm_pu: FloatWrapper,
    va_degree: FloatWrapper,
    p_pu: FloatWrapper,
    q_pu: FloatWrapper,
}

#[derive(Debug, Tabled)]
struct BranchResTable {
    branch: usize,
    p_from_pu: FloatWrapper,
    q_from_pu: FloatWrapper,
    pl_pu: FloatWrapper,
    ql_pu: FloatWrapper,
    loading_percent: FloatWrapper,
    overload_pu: FloatWrapper,
}

impl GlobalResultSet {
    /// Markdown table of the bus results of scenario `t`.
    pub fn bus_table(&self, t: usize) -> String {
        let rows = (0..self.n_bus()).map(|b| {
            let v = self.voltage[(t, b)];
            let s = self.s_bus[(t, b)];
            BusResTable {
                bus: b,
                vm_pu: FloatWrapper::new(v.norm(), 5),
                va_degree: FloatWrapper::new(v.arg().to_degrees(), 5),
                p_pu: FloatWrapper::new(s.re, 5),
                q_pu: FloatWrapper::new(s.im, 5),
            }
        });
        Table::new(rows).with(Style::markdown()).to_string()
    }

    /// Markdown table of the branch results of scenario `t`.
    pub fn branch_table(&self, t: usize) -> String {
        let rows = (0..self.n_branch()).map(|k| {
            let s = self.s_branch[(t, k)];
            let l = self.losses[(t, k)];
            BranchResTable {
                branch: k,
                p_from_pu: FloatWrapper::new(s.re, 5),
                q_from_pu: FloatWrapper::new(s.im, 5),
                pl_pu: FloatWrapper::new(l.re, 6),
                ql_pu: FloatWrapper::new(l.im, 6),
                loading_percent: FloatWrapper::new(self.loading_percent[(t, k)], 2),
                overload_pu: FloatWrapper::new(self.overloads[(t, k)], 5),
            }
        });
        Table::new(rows).with(Style::markdown()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn float_wrapper_rounds_to_precision() {
        assert_eq!(FloatWrapper::new(1.23456, 2).to_string(), "1.23");
        assert_eq!(format!("{:?}", FloatWrapper::default()), "0.000");
    }

    #[test]
    fn tables_list_every_row() {
        let mut results = GlobalResultSet::new(1, 2, 1, 1);
        results.voltage[(0, 0)] = Complex64::new(1.0, 0.0);
        results.voltage[(0, 1)] = Complex64::new(0.995, 0.0);
        results.loading_percent[(0, 0)] = 42.0;
        let buses = results.bus_table(0);
        assert!(buses.contains("vm_pu"));
        assert!(buses.contains("0.99500"));
        assert_eq!(buses.lines().count(), 4);
        let branches = results.branch_table(0);
        assert!(branches.contains("42.00"));
    }
}
