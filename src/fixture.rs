//! Small synthetic closed-shell reference shared by unit tests.

use crate::prelude::*;
use itertools::iproduct;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const NAO: usize = 4;
const NAUX: usize = 6;
const NDOCC: usize = 1;

pub fn random_tensor(shape: &[usize], seed: u64) -> Tsr {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..shape.iter().product::<usize>()).map(|_| rng.gen_range(-1.0..1.0)).collect::<Vec<f64>>();
    rt::asarray((data, shape.to_vec().c(), &DeviceTsr::default()))
}

/// `(uv|kl) = sum_P B[P, u, v] B[P, k, l]` with `B` symmetric in `u, v`, so the usual 8-fold
/// permutational symmetry holds.
pub fn model_int2e(nao: usize) -> Tsr {
    let mut rng = StdRng::seed_from_u64(2015);
    let mut cderi = vec![0.0; NAUX * nao * nao];
    for (p, u, v) in iproduct!(0..NAUX, 0..nao, 0..nao) {
        if u <= v {
            let val = 0.15 * rng.gen_range(-1.0..1.0);
            cderi[(p * nao + u) * nao + v] = val;
            cderi[(p * nao + v) * nao + u] = val;
        }
    }
    let cderi: Tsr = rt::asarray((cderi, vec![NAUX, nao * nao].c(), &DeviceTsr::default()));
    (cderi.t() % &cderi).into_shape([nao, nao, nao, nao])
}

pub fn model_reference_input() -> SpinReferenceInput {
    let device = DeviceTsr::default();
    let diagonal = [-3.0, 0.4, 0.8, 1.2];

    let noise = random_tensor(&[NAO, NAO], 7);
    let mut hcore: Tsr = 0.025 * (&noise + &noise.t());
    for (p, &h) in diagonal.iter().enumerate() {
        hcore[[p, p]] = h;
    }

    let mut mo_coeff: Tsr = 0.05 * random_tensor(&[NAO, NAO], 13);
    for p in 0..NAO {
        mo_coeff[[p, p]] += 1.0;
    }

    let mo_energy: Tsr = rt::asarray((diagonal.to_vec(), vec![NAO].c(), &device));
    SpinReferenceInput { hcore, mo_coeff, mo_energy, ndocc: NDOCC }
}

pub fn model_reference() -> ReferenceData {
    let input = model_reference_input();
    let int2e = model_int2e(input.nao());
    let engine = ContractionEngine::new();
    ReferenceData::build(&input, &CCSDConfig::default(), |c| util::mo_spin_eri(&int2e, c, &engine)).unwrap()
}

pub fn model_engine() -> CCSDEngine {
    CCSDEngine::new(Arc::new(model_reference())).unwrap()
}
