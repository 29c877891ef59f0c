use crate::prelude::*;

/* #region reference input */

/// Mean-field reference data handed over by the integral provider.
///
/// Shapes: `hcore` is `(nao, nao)` in atomic-orbital basis, `mo_coeff` is `(nao, nmo)`, `mo_energy` is `(nmo,)`.
#[derive(Debug)]
pub struct SpinReferenceInput {
    pub hcore: Tsr,
    pub mo_coeff: Tsr,
    pub mo_energy: Tsr,
    pub ndocc: usize,
}

impl SpinReferenceInput {
    pub fn nao(&self) -> usize {
        self.mo_coeff.shape()[0]
    }

    pub fn nmo(&self) -> usize {
        self.mo_coeff.shape()[1]
    }

    pub fn nso(&self) -> usize {
        2 * self.nmo()
    }

    pub fn nocc(&self) -> usize {
        2 * self.ndocc
    }

    pub fn nvir(&self) -> usize {
        self.nso() - self.nocc()
    }
}

/* #endregion */

/* #region CCSD */

#[derive(Debug, Clone)]
pub struct CCSDConfig {
    /// Memory budget (GB) checked before the spin-orbital integrals are materialized.
    pub memory_gb: f64,
    pub max_cycle: usize,
    pub conv_tol_e: f64,
    pub conv_tol_t1: f64,
    pub conv_tol_t2: f64,
}

impl Default for CCSDConfig {
    fn default() -> Self {
        Self { memory_gb: 2.0, max_cycle: 64, conv_tol_e: 1.0e-7, conv_tol_t1: 1.0e-5, conv_tol_t2: 1.0e-5 }
    }
}

/// Singles `t1[i, a]` and doubles `t2[i, j, a, b]` amplitudes.
#[derive(Debug)]
pub struct CCSDAmplitudes {
    pub t1: Tsr,
    pub t2: Tsr,
}

/// Amplitude-dressed effective operators, rebuilt at the start of every update.
#[derive(Debug)]
pub struct CCSDIntermediates {
    pub fae: Tsr,
    pub fmi: Tsr,
    pub fme: Tsr,
    pub w_mnij: Tsr,
    pub w_abef: Tsr,
    pub w_mbej: Tsr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CCSDStage {
    /// Amplitudes still hold the second-order perturbative guess.
    Initialized,
    /// Amplitudes after the given number of `update` calls.
    Iterated(usize),
}

#[derive(Debug)]
pub struct CCSDResults {
    pub e_corr: f64,
    pub t1: Tsr,
    pub t2: Tsr,
}

/* #endregion */
