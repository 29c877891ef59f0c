//! Immutable spin-orbital reference data: integrals, Fock matrix and denominators.

use crate::prelude::*;
use std::ops::Range;

/// Integral, Fock and denominator tensors, built once and shared read-only by the engine.
///
/// Orbital ordering is `[0, nocc)` occupied and `[nocc, nso)` virtual.
#[derive(Debug)]
pub struct ReferenceData {
    pub nmo: usize,
    pub nso: usize,
    pub nocc: usize,
    pub nvir: usize,
    /// Antisymmetrized `<pq||rs>`, shape `(nso, nso, nso, nso)`.
    pub eri: Tsr,
    /// Spin-orbital Fock matrix, shape `(nso, nso)`.
    pub fock: Tsr,
    /// `f_ii - f_aa`, shape `(nocc, nvir)`.
    pub d_ia: Tsr,
    /// `f_ii + f_jj - f_aa - f_bb`, shape `(nocc, nocc, nvir, nvir)`.
    pub d_ijab: Tsr,
}

impl ReferenceData {
    /// Build the reference from mean-field data.
    ///
    /// `eri_builder` receives the MO coefficients and must return `<pq||rs>` of shape `(nso,)*4`. It is
    /// only called once the estimated footprint has passed the `config.memory_gb` check.
    pub fn build<F>(input: &SpinReferenceInput, config: &CCSDConfig, eri_builder: F) -> Result<Self, CCError>
    where
        F: FnOnce(&Tsr) -> Result<Tsr, CCError>,
    {
        let timer_outer = std::time::Instant::now();
        Self::check_input(input)?;

        let nmo = input.nmo();
        let nso = input.nso();
        let nocc = input.nocc();
        let nvir = input.nvir();

        info!("Spatial orbitals: {nmo}, spin orbitals: {nso} (occupied {nocc}, virtual {nvir})");

        // core hamiltonian, AO -> MO -> spin orbital
        let h_mo = input.mo_coeff.t() % &input.hcore % &input.mo_coeff;
        let h_so = util::spin_block_diagonal(&h_mo);

        let eri_gb = util::eri_memory_gb(nso);
        let footprint = util::ERI_SAFETY_FACTOR * eri_gb;
        if footprint > config.memory_gb {
            return Err(CCError::ResourceLimitExceeded { required_gb: footprint, limit_gb: config.memory_gb });
        }

        let timer = std::time::Instant::now();
        let eri = eri_builder(&input.mo_coeff)?;
        if eri.shape().to_vec() != vec![nso; 4] {
            return Err(CCError::ShapeMismatch {
                spec: "<pq||rs>".to_string(),
                detail: format!("integral builder returned shape {:?}, expected {:?}", eri.shape(), [nso; 4]),
            });
        }
        info!("Size of the ERI tensor is {eri_gb:.2} GB, {nmo} basis functions");
        debug!("Time elapsed (spin-orbital ERI): {:?}", timer.elapsed());

        // f_pq = h_pq + sum_m <pm||qm>
        let mut fock = h_so;
        for m in 0..nocc {
            fock += eri.i((.., m, .., m));
        }

        let f_diag = fock.diagonal(None).to_owned();
        Self::check_canonical(&f_diag, &input.mo_energy);

        let d_ia = f_diag.i((0..nocc, None)) - f_diag.i((None, nocc..nso));
        let d_ijab = d_ia.i((.., None, .., None)) + d_ia.i((None, .., None, ..));

        debug!("Time elapsed (reference data): {:?}", timer_outer.elapsed());
        Ok(Self { nmo, nso, nocc, nvir, eri, fock, d_ia, d_ijab })
    }

    fn check_input(input: &SpinReferenceInput) -> Result<(), CCError> {
        let hcore_shape = input.hcore.shape().to_vec();
        let coeff_shape = input.mo_coeff.shape().to_vec();
        if hcore_shape.len() != 2 || hcore_shape[0] != hcore_shape[1] {
            return Err(CCError::InvalidReference(format!("core hamiltonian must be square, got {hcore_shape:?}")));
        }
        if coeff_shape.len() != 2 || coeff_shape[0] != hcore_shape[0] {
            return Err(CCError::InvalidReference(format!(
                "MO coefficients {coeff_shape:?} do not match core hamiltonian {hcore_shape:?}"
            )));
        }
        if input.mo_energy.shape().to_vec() != vec![coeff_shape[1]] {
            return Err(CCError::InvalidReference(format!(
                "orbital energies {:?} do not match {} molecular orbitals",
                input.mo_energy.shape(),
                coeff_shape[1]
            )));
        }
        if input.ndocc == 0 || input.ndocc >= coeff_shape[1] {
            return Err(CCError::InvalidReference(format!(
                "{} doubly occupied orbitals leave no occupied or no virtual space in {} orbitals",
                input.ndocc, coeff_shape[1]
            )));
        }
        Ok(())
    }

    /// Warn when the Fock diagonal does not reproduce the orbital energies.
    fn check_canonical(f_diag: &Tsr, mo_energy: &Tsr) {
        let max_dev = (0..f_diag.shape()[0]).map(|p| (f_diag[[p]] - mo_energy[[p / 2]]).abs()).fold(0.0, f64::max);
        if max_dev > 1.0e-6 {
            warn!("Fock diagonal deviates from orbital energies by {max_dev:.3e}; reference may be non-canonical");
        }
    }

    fn block_range(&self, label: char) -> Option<Range<usize>> {
        match label {
            'o' => Some(0..self.nocc),
            'v' => Some(self.nocc..self.nso),
            _ => None,
        }
    }

    fn block_ranges<const N: usize>(&self, labels: &str) -> Result<[Range<usize>; N], CCError> {
        let invalid = || CCError::InvalidLabel { labels: labels.to_string(), expected: N };
        let chars = labels.chars().collect::<Vec<char>>();
        if chars.len() != N {
            return Err(invalid());
        }
        let mut ranges: [Range<usize>; N] = std::array::from_fn(|_| 0..0);
        for (range, &c) in ranges.iter_mut().zip(&chars) {
            *range = self.block_range(c).ok_or_else(invalid)?;
        }
        Ok(ranges)
    }

    /// Occupied/virtual block of `<pq||rs>`, e.g. `mo("oovv")`.
    pub fn mo(&self, labels: &str) -> Result<TsrView<'_>, CCError> {
        let [p, q, r, s] = self.block_ranges::<4>(labels)?;
        Ok(self.eri.i((p, q, r, s)))
    }

    /// Occupied/virtual block of the Fock matrix, e.g. `fock_block("ov")`.
    pub fn fock_block(&self, labels: &str) -> Result<TsrView<'_>, CCError> {
        let [p, q] = self.block_ranges::<2>(labels)?;
        Ok(self.fock.i((p, q)))
    }
}
