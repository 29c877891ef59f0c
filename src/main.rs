use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, bail};
use rstsr::prelude::*;
use showcase_workshop_rstsr_soccsd::prelude::*;
use showcase_workshop_rstsr_soccsd::*;
use std::fs::File;
use tracing::info;
use tracing_subscriber::{Registry, fmt::layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[clap(version, about = "Run a minimal spin-orbital CCSD calculation on top of converged RHF data", long_about = None)]
struct CliArgs {
    #[clap(long = "hcore", help = "Path to the npy file of the AO core hamiltonian (nao, nao)")]
    hcore_file: String,

    #[clap(long = "mo_coeff", help = "Path to the npy file of the MO coefficients (nao, nmo)")]
    mo_coeff_file: String,

    #[clap(long = "mo_energy", help = "Path to the npy file of the orbital energies (nmo,)")]
    mo_energy_file: String,

    #[clap(long = "eri", help = "Path to the npy file of the AO two-electron integrals (uv|kl)")]
    eri_file: String,

    #[clap(long = "ndocc", help = "Number of doubly occupied orbitals")]
    ndocc: usize,

    #[clap(long = "memory", help = "Memory budget in GB for the spin-orbital integrals")]
    memory_gb: Option<f64>,

    #[clap(long = "max_cycle", help = "Maximum number of CCSD iterations")]
    max_cycle: Option<usize>,

    #[clap(long = "conv_tol_e", help = "Convergence threshold of the correlation energy")]
    conv_tol_e: Option<f64>,

    #[clap(long = "conv_tol_t", help = "Convergence threshold of the t1 and t2 change norms")]
    conv_tol_t: Option<f64>,

    #[clap(short, long, help = "Write the log to this file instead of stdout")]
    output: Option<String>,
}

fn setup_output(output: Option<&String>) -> Result<()> {
    match output {
        Some(path) => {
            let log = File::create(path).wrap_err_with(|| format!("Could not create output file: {path}"))?;
            Registry::default().with(layer().with_writer(log).with_ansi(false)).init();
        },
        None => Registry::default().with(layer().with_writer(std::io::stdout)).init(),
    }
    Ok(())
}

fn tensor_from_file(fname: &str) -> Result<Tsr> {
    // c-contiguous numpy array, read as row-major
    let device = DeviceTsr::default();
    let bytes = std::fs::read(fname).wrap_err_with(|| format!("Unable to read npy file: {fname}"))?;
    let npy = npyz::NpyFile::new(&bytes[..]).wrap_err_with(|| format!("Invalid npy file: {fname}"))?;
    let shape = npy.shape().iter().map(|x| *x as usize).collect::<Vec<usize>>();
    let data: Vec<f64> = npy.into_vec().wrap_err_with(|| format!("Expected f64 data in: {fname}"))?;
    Ok(rt::asarray((data, shape.c(), &device)))
}

fn ccsd_iteration(engine: &mut CCSDEngine, cc_config: &CCSDConfig) -> Result<CCSDResults> {
    let mut ccsd_results = engine.results()?;
    info!("Initial energy (MP2): {:?}", ccsd_results.e_corr);

    for niter in 0..cc_config.max_cycle {
        let timer = std::time::Instant::now();
        info!("Iteration: {:?}", niter);
        engine.update()?;
        let ccsd_results_new = engine.results()?;

        let diff_eng = ccsd_results_new.e_corr - ccsd_results.e_corr;
        let norm_t1 = (&ccsd_results_new.t1 - &ccsd_results.t1).l2_norm();
        let norm_t2 = (&ccsd_results_new.t2 - &ccsd_results.t2).l2_norm();
        info!("    Energy: {:?}", ccsd_results_new.e_corr);
        info!("    Energy diff: {:?}", diff_eng);
        info!("    T1 norm: {:?}", norm_t1);
        info!("    T2 norm: {:?}", norm_t2);
        info!("Time elapsed (ccsd iteration): {:?}", timer.elapsed());

        ccsd_results = ccsd_results_new;
        if diff_eng.abs() < cc_config.conv_tol_e && norm_t1 < cc_config.conv_tol_t1 && norm_t2 < cc_config.conv_tol_t2 {
            info!("CCSD converged in {} iterations.", niter + 1);
            return Ok(ccsd_results);
        }
    }

    bail!("CCSD did not converge in {} iterations", cc_config.max_cycle)
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = CliArgs::parse();
    setup_output(args.output.as_ref())?;

    let mut cc_config = CCSDConfig::default();
    if let Some(memory_gb) = args.memory_gb {
        cc_config.memory_gb = memory_gb;
    }
    if let Some(max_cycle) = args.max_cycle {
        cc_config.max_cycle = max_cycle;
    }
    if let Some(conv_tol_e) = args.conv_tol_e {
        cc_config.conv_tol_e = conv_tol_e;
    }
    if let Some(conv_tol_t) = args.conv_tol_t {
        cc_config.conv_tol_t1 = conv_tol_t;
        cc_config.conv_tol_t2 = conv_tol_t;
    }
    info!("Configuration: {:?}", cc_config);

    let time = std::time::Instant::now();
    let input = SpinReferenceInput {
        hcore: tensor_from_file(&args.hcore_file)?,
        mo_coeff: tensor_from_file(&args.mo_coeff_file)?,
        mo_energy: tensor_from_file(&args.mo_energy_file)?,
        ndocc: args.ndocc,
    };
    let int2e = tensor_from_file(&args.eri_file)?;
    let nao = input.nao();
    if int2e.shape().to_vec() != vec![nao; 4] {
        bail!("AO integrals have shape {:?}, expected {:?}", int2e.shape(), [nao; 4]);
    }

    let contractor = ContractionEngine::new();
    let mut engine = CCSDEngine::from_input(&input, &cc_config, |c| util::mo_spin_eri(&int2e, c, &contractor))?;
    let ccsd_results = ccsd_iteration(&mut engine, &cc_config)?;

    info!("CCSD Corr Energy: {}", ccsd_results.e_corr);
    info!("Elapsed time for CCSD: {:.2?}", time.elapsed());
    Ok(())
}
