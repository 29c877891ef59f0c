#![allow(clippy::deref_addrof)]

pub mod prelude;

pub mod ccsd;
pub mod contract;
pub mod error;
pub mod reference;
pub mod structs;
pub mod util;

#[cfg(test)]
mod fixture;

#[test]
fn playground_ccsd() {
    use crate::prelude::*;

    let input = fixture::model_reference_input();
    let int2e = fixture::model_int2e(input.nao());
    let cc_config = CCSDConfig::default();

    let contractor = ContractionEngine::new();
    let mut engine =
        CCSDEngine::from_input(&input, &cc_config, |c| util::mo_spin_eri(&int2e, c, &contractor)).unwrap();
    println!("MP2 Corr Energy: {}", engine.compute_corr_energy().unwrap());

    for _ in 0..cc_config.max_cycle {
        let e_old = engine.compute_corr_energy().unwrap();
        engine.update().unwrap();
        if (engine.compute_corr_energy().unwrap() - e_old).abs() < cc_config.conv_tol_e {
            break;
        }
    }
    println!("CCSD Corr Energy: {}", engine.compute_corr_energy().unwrap());
}
