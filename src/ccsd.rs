//! Spin-orbital CCSD amplitude equations.
//!
//! Intermediates and residuals follow the antisymmetrized spin-orbital formulation
//! (Stanton, Gauss, Watts, Bartlett, J. Chem. Phys. 94, 4334 (1991)). Occupied indices are
//! `i, j, k, l, m, n`, virtual indices `a, b, c, d, e, f`.

use crate::prelude::*;
use crate::util::antisymmetrize;
use std::sync::Arc;

/// Amplitude engine: shared reference data plus the current amplitudes.
///
/// The only state transition is [`CCSDEngine::update`], which replaces both amplitude tensors
/// as a whole. Convergence control is left to the caller.
pub struct CCSDEngine {
    reference: Arc<ReferenceData>,
    amplitudes: CCSDAmplitudes,
    stage: CCSDStage,
    contractor: ContractionEngine,
}

impl CCSDEngine {
    /// Start from second-order perturbative amplitudes: `t1 = 0`, `t2 = <ij||ab> / D_ijab`.
    pub fn new(reference: Arc<ReferenceData>) -> Result<Self, CCError> {
        let timer = std::time::Instant::now();
        let device = reference.eri.device().clone();

        let t1: Tsr = rt::zeros(([reference.nocc, reference.nvir], &device));
        let t2 = reference.mo("oovv")? / &reference.d_ijab;
        debug!("Time elapsed (initial guess): {:?}", timer.elapsed());

        Ok(Self {
            reference,
            amplitudes: CCSDAmplitudes { t1, t2 },
            stage: CCSDStage::Initialized,
            contractor: ContractionEngine::new(),
        })
    }

    /// Build the reference data and the engine in one go.
    pub fn from_input<F>(input: &SpinReferenceInput, config: &CCSDConfig, eri_builder: F) -> Result<Self, CCError>
    where
        F: FnOnce(&Tsr) -> Result<Tsr, CCError>,
    {
        let reference = ReferenceData::build(input, config, eri_builder)?;
        Self::new(Arc::new(reference))
    }

    pub fn reference(&self) -> &Arc<ReferenceData> {
        &self.reference
    }

    pub fn amplitudes(&self) -> &CCSDAmplitudes {
        &self.amplitudes
    }

    pub fn t1(&self) -> &Tsr {
        &self.amplitudes.t1
    }

    pub fn t2(&self) -> &Tsr {
        &self.amplitudes.t2
    }

    pub fn stage(&self) -> CCSDStage {
        self.stage
    }

    pub fn contractor(&self) -> &ContractionEngine {
        &self.contractor
    }

    fn contract(&self, spec: &str, a: TsrView, b: TsrView, scale: Option<f64>) -> Result<Tsr, CCError> {
        self.contractor.contract(spec, a, b, scale)
    }

    /* #region effective pair amplitudes */

    /// `tau~_ijab = t_ijab + 1/2 P_ab (t_ia t_jb)`
    pub fn build_tilde_tau(&self) -> Result<Tsr, CCError> {
        let t1 = self.t1();
        let scr = self.contract("ia,jb->ijab", t1.view(), t1.view(), Some(0.5))?;
        Ok(self.t2() + antisymmetrize(&scr, 2, 3))
    }

    /// `tau_ijab = t_ijab + P_ab (t_ia t_jb)`
    pub fn build_tau(&self) -> Result<Tsr, CCError> {
        let t1 = self.t1();
        let scr = self.contract("ia,jb->ijab", t1.view(), t1.view(), None)?;
        Ok(self.t2() + antisymmetrize(&scr, 2, 3))
    }

    /* #endregion */

    /* #region intermediates */

    pub fn build_fae(&self) -> Result<Tsr, CCError> {
        let r = &self.reference;
        let t1 = self.t1();

        let mut fae = r.fock_block("vv")?.to_owned();
        fae.diagonal_mut(None).fill(0.0);

        fae -= self.contract("me,ma->ae", r.fock_block("ov")?, t1.view(), Some(0.5))?;
        fae += self.contract("mf,mafe->ae", t1.view(), r.mo("ovvv")?, None)?;
        fae -= self.contract("mnaf,mnef->ae", self.build_tilde_tau()?.view(), r.mo("oovv")?, Some(0.5))?;
        Ok(fae)
    }

    pub fn build_fmi(&self) -> Result<Tsr, CCError> {
        let r = &self.reference;
        let t1 = self.t1();

        let mut fmi = r.fock_block("oo")?.to_owned();
        fmi.diagonal_mut(None).fill(0.0);

        fmi += self.contract("ie,me->mi", t1.view(), r.fock_block("ov")?, Some(0.5))?;
        fmi += self.contract("ne,mnie->mi", t1.view(), r.mo("ooov")?, None)?;
        fmi += self.contract("inef,mnef->mi", self.build_tilde_tau()?.view(), r.mo("oovv")?, Some(0.5))?;
        Ok(fmi)
    }

    pub fn build_fme(&self) -> Result<Tsr, CCError> {
        let r = &self.reference;
        let mut fme = r.fock_block("ov")?.to_owned();
        fme += self.contract("nf,mnef->me", self.t1().view(), r.mo("oovv")?, None)?;
        Ok(fme)
    }

    pub fn build_wmnij(&self) -> Result<Tsr, CCError> {
        let r = &self.reference;
        let mut w_mnij = r.mo("oooo")?.to_owned();

        let scr = self.contract("je,mnie->mnij", self.t1().view(), r.mo("ooov")?, None)?;
        w_mnij += antisymmetrize(&scr, 2, 3);
        w_mnij += self.contract("ijef,mnef->mnij", self.build_tau()?.view(), r.mo("oovv")?, Some(0.25))?;
        Ok(w_mnij)
    }

    pub fn build_wabef(&self) -> Result<Tsr, CCError> {
        let r = &self.reference;
        let mut w_abef = r.mo("vvvv")?.to_owned();

        let scr = self.contract("mb,amef->abef", self.t1().view(), r.mo("vovv")?, None)?;
        w_abef -= antisymmetrize(&scr, 0, 1);
        w_abef += self.contract("mnab,mnef->abef", self.build_tau()?.view(), r.mo("oovv")?, Some(0.25))?;
        Ok(w_abef)
    }

    pub fn build_wmbej(&self) -> Result<Tsr, CCError> {
        let r = &self.reference;
        let t1 = self.t1();
        let mut w_mbej = r.mo("ovvo")?.to_owned();

        w_mbej += self.contract("jf,mbef->mbej", t1.view(), r.mo("ovvv")?, None)?;
        w_mbej -= self.contract("nb,mnej->mbej", t1.view(), r.mo("oovo")?, None)?;

        // 1/2 t_jnfb + t_jf t_nb
        let scr: Tsr = 0.5 * self.t2() + self.contract("jf,nb->jnfb", t1.view(), t1.view(), None)?;
        w_mbej -= self.contract("jnfb,mnef->mbej", scr.view(), r.mo("oovv")?, None)?;
        Ok(w_mbej)
    }

    /// All six intermediates from the current amplitudes.
    ///
    /// None of them depends on another, so they are built as independent rayon tasks.
    pub fn build_intermediates(&self) -> Result<CCSDIntermediates, CCError> {
        let timer = std::time::Instant::now();
        let ((fae, fmi), (fme, (w_mnij, (w_abef, w_mbej)))) = rayon::join(
            || rayon::join(|| self.build_fae(), || self.build_fmi()),
            || {
                rayon::join(
                    || self.build_fme(),
                    || {
                        rayon::join(
                            || self.build_wmnij(),
                            || rayon::join(|| self.build_wabef(), || self.build_wmbej()),
                        )
                    },
                )
            },
        );
        let intermediates = CCSDIntermediates {
            fae: fae?,
            fmi: fmi?,
            fme: fme?,
            w_mnij: w_mnij?,
            w_abef: w_abef?,
            w_mbej: w_mbej?,
        };
        debug!("Time elapsed (intermediates): {:?}", timer.elapsed());
        Ok(intermediates)
    }

    /* #endregion */

    /* #region residuals */

    pub fn get_rhs1(&self, intermediates: &CCSDIntermediates) -> Result<Tsr, CCError> {
        let r = &self.reference;
        let (t1, t2) = (self.t1(), self.t2());
        let CCSDIntermediates { fae, fmi, fme, .. } = intermediates;

        let mut rhs1 = r.fock_block("ov")?.to_owned();
        rhs1 += self.contract("ie,ae->ia", t1.view(), fae.view(), None)?;
        rhs1 -= self.contract("ma,mi->ia", t1.view(), fmi.view(), None)?;
        rhs1 += self.contract("imae,me->ia", t2.view(), fme.view(), None)?;
        rhs1 -= self.contract("nf,naif->ia", t1.view(), r.mo("ovov")?, None)?;
        rhs1 -= self.contract("imef,maef->ia", t2.view(), r.mo("ovvv")?, Some(0.5))?;
        rhs1 -= self.contract("mnae,nmei->ia", t2.view(), r.mo("oovo")?, Some(0.5))?;
        Ok(rhs1)
    }

    pub fn get_rhs2(&self, intermediates: &CCSDIntermediates) -> Result<Tsr, CCError> {
        let r = &self.reference;
        let (t1, t2) = (self.t1(), self.t2());
        let CCSDIntermediates { fae, fmi, fme, w_mnij, w_abef, w_mbej } = intermediates;

        let mut rhs2 = r.mo("oovv")?.to_owned();

        // P_ab t_ijae (F_be - 1/2 t_mb F_me)
        let scr_be = fae - self.contract("mb,me->be", t1.view(), fme.view(), Some(0.5))?;
        let scr = self.contract("ijae,be->ijab", t2.view(), scr_be.view(), None)?;
        rhs2 += antisymmetrize(&scr, 2, 3);

        // - P_ij t_imab (F_mj + 1/2 t_je F_me)
        let scr_mj = fmi + self.contract("je,me->mj", t1.view(), fme.view(), Some(0.5))?;
        let scr = self.contract("imab,mj->ijab", t2.view(), scr_mj.view(), None)?;
        rhs2 -= antisymmetrize(&scr, 0, 1);

        // ladders: 1/2 tau_mnab W_mnij + 1/2 tau_ijef W_abef
        let tau = self.build_tau()?;
        rhs2 += self.contract("mnab,mnij->ijab", tau.view(), w_mnij.view(), Some(0.5))?;
        rhs2 += self.contract("ijef,abef->ijab", tau.view(), w_abef.view(), Some(0.5))?;

        // P_ij P_ab (t_imae W_mbej - t_ie t_ma <mb||ej>)
        let scr_mbij = self.contract("ie,mbej->mbij", t1.view(), r.mo("ovvo")?, None)?;
        let scr = self.contract("imae,mbej->ijab", t2.view(), w_mbej.view(), None)?
            - self.contract("ma,mbij->ijab", t1.view(), scr_mbij.view(), None)?;
        rhs2 += antisymmetrize(&antisymmetrize(&scr, 0, 1), 2, 3);

        // P_ij t_ie <ab||ej>
        let scr = self.contract("ie,abej->ijab", t1.view(), r.mo("vvvo")?, None)?;
        rhs2 += antisymmetrize(&scr, 0, 1);

        // - P_ab t_ma <mb||ij>
        let scr = self.contract("ma,mbij->ijab", t1.view(), r.mo("ovoo")?, None)?;
        rhs2 -= antisymmetrize(&scr, 2, 3);

        Ok(rhs2)
    }

    /* #endregion */

    /// One fixed-point step: `t1 = rhs1 / D_ia`, `t2 = rhs2 / D_ijab`.
    ///
    /// On error the current amplitudes are kept.
    pub fn update(&mut self) -> Result<(), CCError> {
        let timer_outer = std::time::Instant::now();

        let intermediates = self.build_intermediates()?;

        let timer = std::time::Instant::now();
        let rhs1 = self.get_rhs1(&intermediates)?;
        debug!("Time elapsed (rhs1): {:?}", timer.elapsed());

        let timer = std::time::Instant::now();
        let rhs2 = self.get_rhs2(&intermediates)?;
        debug!("Time elapsed (rhs2): {:?}", timer.elapsed());

        let t1 = rhs1 / &self.reference.d_ia;
        let t2 = rhs2 / &self.reference.d_ijab;
        self.amplitudes = CCSDAmplitudes { t1, t2 };
        self.stage = match self.stage {
            CCSDStage::Initialized => CCSDStage::Iterated(1),
            CCSDStage::Iterated(niter) => CCSDStage::Iterated(niter + 1),
        };

        debug!("Time elapsed (ccsd amplitude): {:?}", timer_outer.elapsed());
        Ok(())
    }

    /// `E = f_ia t_ia + 1/4 <ij||ab> t_ijab + 1/2 <ij||ab> t_ia t_jb`
    pub fn compute_corr_energy(&self) -> Result<f64, CCError> {
        let r = &self.reference;
        let (t1, t2) = (self.t1(), self.t2());
        let eri_oovv = r.mo("oovv")?;

        let e_t1 = (&r.fock_block("ov")? * t1).sum_all();
        let e_t2 = 0.25 * (&eri_oovv * t2).sum_all();
        let scr_jb = self.contract("ijab,ia->jb", eri_oovv.view(), t1.view(), None)?;
        let e_t1t1 = 0.5 * (&scr_jb * t1).sum_all();
        Ok(e_t1 + e_t2 + e_t1t1)
    }

    /// Snapshot of the current energy and amplitudes.
    pub fn results(&self) -> Result<CCSDResults, CCError> {
        Ok(CCSDResults { e_corr: self.compute_corr_energy()?, t1: self.t1().to_owned(), t2: self.t2().to_owned() })
    }
}
