use crate::prelude::*;
use itertools::iproduct;

/// Bytes per element of the real integral tensor; complex (16-byte) storage is never used.
const F64_BYTES: f64 = 8.0;

/// Working-memory multiple of the bare integral tensor assumed during setup.
pub const ERI_SAFETY_FACTOR: f64 = 5.0;

/// Antisymmetrizer `P_pq[X] = X - X.swapaxes(p, q)`.
///
/// Axes `p` and `q` must have equal extent.
pub fn antisymmetrize(x: &Tsr, p: usize, q: usize) -> Tsr {
    x - &x.swapaxes(p as isize, q as isize)
}

/// Size (GB) of a rank-4 spin-orbital integral tensor with `nso` orbitals per axis.
pub fn eri_memory_gb(nso: usize) -> f64 {
    (nso as f64).powi(4) * F64_BYTES * 1.0e-9
}

/// Tile a spatial one-electron matrix into spin-orbital basis.
///
/// Spin-orbital `2p` is the alpha and `2p + 1` the beta copy of spatial orbital `p`; mixed-spin
/// blocks are zero.
pub fn spin_block_diagonal(h: &Tsr) -> Tsr {
    let n = h.shape()[0];
    let mut h_so: Tsr = rt::zeros(([2 * n, 2 * n], h.device()));
    for (p, q) in iproduct!(0..2 * n, 0..2 * n) {
        if p % 2 == q % 2 {
            h_so[[p, q]] = h[[p / 2, q / 2]];
        }
    }
    h_so
}

/// Antisymmetrized two-electron integrals `<pq||rs>` in spin-orbital molecular basis.
///
/// `int2e` is the atomic-orbital tensor in chemists' notation `(uv|kl)`, row-major. The four
/// quarter transformations run through `engine`, then spin orbitals are expanded with the same
/// alpha/beta interleaving as [`spin_block_diagonal`].
///
/// # Usage
///
/// ```ignore
/// let engine = ContractionEngine::new();
/// let eri_so = util::mo_spin_eri(&int2e, &mo_coeff, &engine)?;
/// ```
pub fn mo_spin_eri(int2e: &Tsr, mo_coeff: &Tsr, engine: &ContractionEngine) -> Result<Tsr, CCError> {
    let nmo = mo_coeff.shape()[1];
    let nso = 2 * nmo;
    let c = mo_coeff.view();

    let timer = std::time::Instant::now();
    let scr = engine.contract("uvkl,up->pvkl", int2e.view(), c.view(), None)?;
    let scr = engine.contract("pvkl,vq->pqkl", scr.view(), c.view(), None)?;
    let scr = engine.contract("pqkl,kr->pqrl", scr.view(), c.view(), None)?;
    let mo_eri = engine.contract("pqrl,ls->pqrs", scr.view(), c.view(), None)?;
    debug!("Time elapsed (ao2mo): {:?}", timer.elapsed());

    // <pq||rs> = (pr|qs) - (ps|qr), each surviving only for matching spins
    let timer = std::time::Instant::now();
    let mut eri_so: Tsr = rt::zeros(([nso, nso, nso, nso], mo_coeff.device()));
    for (p, q, r, s) in iproduct!(0..nso, 0..nso, 0..nso, 0..nso) {
        let coulomb = if p % 2 == r % 2 && q % 2 == s % 2 { mo_eri[[p / 2, r / 2, q / 2, s / 2]] } else { 0.0 };
        let exchange = if p % 2 == s % 2 && q % 2 == r % 2 { mo_eri[[p / 2, s / 2, q / 2, r / 2]] } else { 0.0 };
        eri_so[[p, q, r, s]] = coulomb - exchange;
    }
    debug!("Time elapsed (spin-orbital antisymmetrization): {:?}", timer.elapsed());

    Ok(eri_so)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixture;

    #[test]
    fn test_antisymmetrize_identities() {
        let x = fixture::random_tensor(&[3, 3, 4, 4], 17);
        for (p, q) in [(0, 1), (2, 3)] {
            let px = antisymmetrize(&x, p, q);
            let swapped = x.swapaxes(p as isize, q as isize).to_owned();
            assert!((&px + &swapped - &x).abs().max_all() < 1.0e-14);
            assert!({ let d: Tsr = antisymmetrize(&px, p, q) - 2.0 * &px; d }.abs().max_all() < 1.0e-14);
            assert!((&px + &px.swapaxes(p as isize, q as isize)).abs().max_all() < 1.0e-14);
        }
    }

    #[test]
    fn test_spin_block_diagonal() {
        let h = fixture::random_tensor(&[3, 3], 2);
        let h_so = spin_block_diagonal(&h);
        assert_eq!(h_so.shape().to_vec(), vec![6, 6]);
        for (p, q) in iproduct!(0..6, 0..6) {
            if p % 2 == q % 2 {
                assert_eq!(h_so[[p, q]], h[[p / 2, q / 2]]);
            } else {
                assert_eq!(h_so[[p, q]], 0.0);
            }
        }
    }

    #[test]
    fn test_mo_spin_eri_symmetry() {
        let input = fixture::model_reference_input();
        let int2e = fixture::model_int2e(input.nao());
        let eri = mo_spin_eri(&int2e, &input.mo_coeff, &ContractionEngine::new()).unwrap();

        // <pq||rs> = -<qp||rs> = -<pq||sr> = <rs||pq>
        assert!((&eri + &eri.swapaxes(0, 1)).abs().max_all() < 1.0e-12);
        assert!((&eri + &eri.swapaxes(2, 3)).abs().max_all() < 1.0e-12);
        assert!((&eri - &eri.transpose([2, 3, 0, 1])).abs().max_all() < 1.0e-12);

        // opposite-spin pair p, r with matching q, s only survives through exchange
        let nso = input.nso();
        for (p, q, r, s) in iproduct!(0..nso, 0..nso, 0..nso, 0..nso) {
            if (p + q + r + s) % 2 == 1 {
                assert_eq!(eri[[p, q, r, s]], 0.0);
            }
        }
    }

    #[test]
    fn test_eri_memory_gb() {
        // 20 spatial orbitals: 40^4 doubles
        assert!((eri_memory_gb(40) - 0.02048).abs() < 1.0e-12);
        // same as nmo^4 * 128e-9 GB, times the working-memory multiple
        assert!((ERI_SAFETY_FACTOR * eri_memory_gb(40) - 20.0_f64.powi(4) * 128.0e-9 * 5.0).abs() < 1.0e-12);
    }
}
