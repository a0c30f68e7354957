use ndarray::Array1;

use crate::error::{check_shape, Error, Result};

/// Tabular state-value function.
///
/// Written only by the engine, once per sweep. Renderers and rollout
/// collectors read it between sweeps.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularValueFun {
    values: Array1<f64>,
}

impl TabularValueFun {
    pub fn zeros(num_states: usize) -> TabularValueFun {
        TabularValueFun { values: Array1::<f64>::zeros(num_states) }
    }

    pub fn from_values(values: Array1<f64>) -> TabularValueFun {
        TabularValueFun { values }
    }

    pub fn num_states(&self) -> usize {
        self.values.len()
    }

    /// Values of every state, or only of `states` when given.
    pub fn get_values(&self, states: Option<&[usize]>) -> Result<Array1<f64>> {
        match states {
            None => Ok(self.values.clone()),
            Some(states) => states
                .iter()
                .map(|&s| {
                    self.values.get(s).copied().ok_or(Error::UnknownState {
                        state: s,
                        num_states: self.values.len(),
                    })
                })
                .collect::<Result<Vec<f64>>>()
                .map(Array1::from),
        }
    }

    /// Borrow the current values without copying.
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Replace all values at once.
    pub fn update(&mut self, values: Array1<f64>) -> Result<()> {
        check_shape("values", self.values.shape(), values.shape())?;
        self.values = values;
        Ok(())
    }
}
