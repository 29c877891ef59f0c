//! Two-operand labeled tensor contraction.
//!
//! A contraction such as `"mnab,mnij->ijab"` is mapped onto a single dense
//! matrix multiply whenever the summed labels can be exposed as one
//! contiguous block of both operands, which is far cheaper than a generic
//! multi-axis summation. Parsed plans are cached per specification string,
//! since the amplitude equations issue the same few dozen contractions on
//! every iteration.

use crate::prelude::*;
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Strategy selected for a contraction, depending only on its labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractionPlan {
    /// Summed labels trail the left operand and lead the right one.
    Plain,
    /// Summed labels lead the left operand and trail the right one.
    BothTransposed,
    /// Summed labels trail both operands.
    RightTransposed,
    /// Summed labels lead both operands.
    LeftTransposed,
    /// One operand is reduced entirely; summed by broadcasting without flattening.
    FallbackSummation,
    /// Tensordot-style contraction after permuting both operands.
    GeneralMultiAxis,
}

/// Parsed form of `"<left>,<right>-><output>"`.
#[derive(Debug, Clone)]
pub struct ContractionSpec {
    pub spec: String,
    pub left: Vec<char>,
    pub right: Vec<char>,
    pub output: Vec<char>,
    /// Summed labels, in the order they appear in `left`.
    pub removed: Vec<char>,
    /// Free labels of `left` followed by free labels of `right`.
    pub natural: Vec<char>,
    /// Axis permutation from `natural` to `output`, if they differ.
    pub permutation: Option<Vec<usize>>,
    pub plan: ContractionPlan,
}

impl ContractionSpec {
    pub fn parse(spec: &str) -> Result<Self, CCError> {
        let invalid = |reason: &str| CCError::InvalidContraction { spec: spec.to_string(), reason: reason.to_string() };

        let (inputs, output) = spec.split_once("->").ok_or_else(|| invalid("missing `->`"))?;
        let (left, right) = inputs.split_once(',').ok_or_else(|| invalid("expected two comma-separated operands"))?;
        if right.contains(',') {
            return Err(invalid("expected exactly two operands"));
        }

        let labels = |s: &str| s.trim().chars().collect::<Vec<char>>();
        let (left, right, output) = (labels(left), labels(right), labels(output));

        for (name, labels) in [("left operand", &left), ("right operand", &right), ("output", &output)] {
            if !labels.iter().all(|c| c.is_alphanumeric()) {
                return Err(invalid(&format!("{name} contains a non-alphanumeric label")));
            }
            if !labels.iter().all_unique() {
                return Err(invalid(&format!("repeated label in {name}")));
            }
        }

        if let Some(c) = output.iter().find(|c| !left.contains(c) && !right.contains(c)) {
            return Err(invalid(&format!("output label `{c}` does not appear in either operand")));
        }

        let removed = left.iter().filter(|c| right.contains(c)).copied().collect_vec();
        if let Some(c) = removed.iter().find(|c| output.contains(c)) {
            return Err(invalid(&format!("label `{c}` appears in both operands and in the output")));
        }
        if let Some(c) = left.iter().chain(right.iter()).find(|c| !removed.contains(c) && !output.contains(c)) {
            return Err(invalid(&format!("label `{c}` is summed over a single operand")));
        }

        let natural = left.iter().chain(right.iter()).filter(|c| !removed.contains(c)).copied().collect_vec();
        let permutation = if natural == output {
            None
        } else {
            Some(output.iter().map(|c| natural.iter().position(|n| n == c).unwrap_or_default()).collect_vec())
        };
        let plan = Self::dispatch(&left, &right, removed.len());

        Ok(Self { spec: spec.to_string(), left, right, output, removed, natural, permutation, plan })
    }

    /// Decide the strategy from the positions of the summed labels; cases are tried in order.
    fn dispatch(left: &[char], right: &[char], rs: usize) -> ContractionPlan {
        let (left_lead, left_trail) = (&left[..rs], &left[left.len() - rs..]);
        let (right_lead, right_trail) = (&right[..rs], &right[right.len() - rs..]);

        if left_trail == right_lead {
            ContractionPlan::Plain
        } else if left_lead == right_trail {
            ContractionPlan::BothTransposed
        } else if left_trail == right_trail {
            ContractionPlan::RightTransposed
        } else if left_lead == right_lead {
            ContractionPlan::LeftTransposed
        } else if left.len() == rs || right.len() == rs {
            ContractionPlan::FallbackSummation
        } else {
            ContractionPlan::GeneralMultiAxis
        }
    }

    /// Map every label to its extent, checking operand ranks and shared extents.
    pub fn extents(&self, shape_left: &[usize], shape_right: &[usize]) -> Result<HashMap<char, usize>, CCError> {
        let mismatch = |detail: String| CCError::ShapeMismatch { spec: self.spec.clone(), detail };

        if shape_left.len() != self.left.len() {
            return Err(mismatch(format!("left operand has rank {}, labels expect {}", shape_left.len(), self.left.len())));
        }
        if shape_right.len() != self.right.len() {
            return Err(mismatch(format!(
                "right operand has rank {}, labels expect {}",
                shape_right.len(),
                self.right.len()
            )));
        }

        let mut extents: HashMap<char, usize> = self.left.iter().copied().zip(shape_left.iter().copied()).collect();
        for (&c, &n) in self.right.iter().zip(shape_right) {
            match extents.get(&c) {
                Some(&m) if m != n => {
                    return Err(mismatch(format!("label `{c}` has extent {m} in left operand but {n} in right operand")));
                },
                _ => {
                    extents.insert(c, n);
                },
            }
        }
        Ok(extents)
    }
}

/// Contraction dispatcher with a memoized plan per specification string.
#[derive(Debug, Default)]
pub struct ContractionEngine {
    plans: Mutex<HashMap<String, Arc<ContractionSpec>>>,
}

impl ContractionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed plan for `spec`, parsing it on first use.
    pub fn plan(&self, spec: &str) -> Result<Arc<ContractionSpec>, CCError> {
        let mut plans = self.plans.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(plan) = plans.get(spec) {
            return Ok(plan.clone());
        }
        let plan = Arc::new(ContractionSpec::parse(spec)?);
        trace!("Cached contraction plan {:?} for `{}`", plan.plan, spec);
        plans.insert(spec.to_string(), plan.clone());
        Ok(plan)
    }

    pub fn cached_plans(&self) -> usize {
        self.plans.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Contract `a` and `b` according to `spec`, optionally multiplying the result by `scale`.
    ///
    /// An empty output label string gives a 0-dimensional tensor.
    ///
    /// # Usage
    ///
    /// ```ignore
    /// let w = engine.contract("mnab,mnef->abef", tau.view(), eri_oovv, Some(0.25))?;
    /// ```
    pub fn contract(&self, spec: &str, a: TsrView, b: TsrView, scale: Option<f64>) -> Result<Tsr, CCError> {
        let plan = self.plan(spec)?;
        let extents = plan.extents(a.shape(), b.shape())?;

        let dim_left = flat_dim(plan.left.iter().filter(|c| !plan.removed.contains(c)), &extents);
        let dim_right = flat_dim(plan.right.iter().filter(|c| !plan.removed.contains(c)), &extents);
        let dim_removed = flat_dim(plan.removed.iter(), &extents);

        let result: Tsr = match plan.plan {
            ContractionPlan::Plain => a.reshape([dim_left, dim_removed]) % b.reshape([dim_removed, dim_right]),
            ContractionPlan::BothTransposed => {
                a.reshape([dim_removed, dim_left]).t() % b.reshape([dim_right, dim_removed]).t()
            },
            ContractionPlan::RightTransposed => a.reshape([dim_left, dim_removed]) % b.reshape([dim_right, dim_removed]).t(),
            ContractionPlan::LeftTransposed => a.reshape([dim_removed, dim_left]).t() % b.reshape([dim_removed, dim_right]),
            ContractionPlan::FallbackSummation => {
                let result = direct_summation(&plan, a, b, &extents);
                return Ok(apply_scale(result, scale));
            },
            ContractionPlan::GeneralMultiAxis => tensordot(&plan, a, b, [dim_left, dim_right, dim_removed]),
        };

        // flat (dim_left, dim_right) result back to labeled axes
        let natural_shape = plan.natural.iter().map(|c| extents[c]).collect_vec();
        let result = result.into_shape(&natural_shape);
        let result = match &plan.permutation {
            Some(perm) => result.transpose(perm).into_contig(RowMajor),
            None => result,
        };

        Ok(apply_scale(result, scale))
    }
}

fn flat_dim<'a>(labels: impl Iterator<Item = &'a char>, extents: &HashMap<char, usize>) -> usize {
    labels.map(|c| extents[c]).product()
}

fn apply_scale(result: Tsr, scale: Option<f64>) -> Tsr {
    match scale {
        Some(scale) => scale * result,
        None => result,
    }
}

/// Permute both operands so the summed axes form one block, then multiply.
fn tensordot(
    plan: &ContractionSpec,
    a: TsrView,
    b: TsrView,
    [dim_left, dim_right, dim_removed]: [usize; 3],
) -> Tsr {
    let position = |labels: &[char], c: &char| labels.iter().position(|l| l == c).unwrap_or_default();

    let perm_a = plan
        .left
        .iter()
        .filter(|c| !plan.removed.contains(c))
        .chain(plan.removed.iter())
        .map(|c| position(&plan.left, c))
        .collect_vec();
    let perm_b = plan
        .removed
        .iter()
        .chain(plan.right.iter().filter(|c| !plan.removed.contains(c)))
        .map(|c| position(&plan.right, c))
        .collect_vec();

    let a = a.transpose(&perm_a).into_contig(RowMajor).into_shape([dim_left, dim_removed]);
    let b = b.transpose(&perm_b).into_contig(RowMajor).into_shape([dim_removed, dim_right]);
    &a % &b
}

/// Sum the elementwise product of both operands broadcast over the union of their labels.
///
/// Only used when one operand has no free axis left, so the broadcast product is no
/// larger than the other operand.
fn direct_summation(
    plan: &ContractionSpec,
    a: TsrView,
    b: TsrView,
    extents: &HashMap<char, usize>,
) -> Tsr {
    // output labels first, summed labels trailing
    let union = plan.output.iter().chain(plan.removed.iter()).copied().collect_vec();

    let broadcast = |x: TsrView, labels: &[char]| -> Tsr {
        let perm = union.iter().filter_map(|c| labels.iter().position(|l| l == c)).collect_vec();
        let shape = union.iter().map(|c| if labels.contains(c) { extents[c] } else { 1 }).collect_vec();
        x.transpose(&perm).into_contig(RowMajor).into_shape(&shape)
    };
    let a = broadcast(a, &plan.left);
    let b = broadcast(b, &plan.right);

    let dim_out = flat_dim(plan.output.iter(), extents);
    let dim_removed = flat_dim(plan.removed.iter(), extents);
    let summed = (&a * &b).into_shape([dim_out, dim_removed]).sum_axes(-1);

    // an empty output shape gives the 0-dimensional result
    let out_shape = plan.output.iter().map(|c| extents[c]).collect_vec();
    summed.into_shape(&out_shape)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn random_vec(size: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..size).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    fn random_tensor(shape: &[usize], seed: u64) -> (Tsr, Vec<f64>) {
        let device = DeviceTsr::default();
        let data = random_vec(shape.iter().product(), seed);
        (rt::asarray((data.clone(), shape.to_vec().c(), &device)), data)
    }

    fn row_major_offset(index: &[usize], shape: &[usize]) -> usize {
        index.iter().zip(shape).fold(0, |acc, (&i, &n)| acc * n + i)
    }

    /// Unoptimized einsum over flat row-major buffers.
    fn reference_einsum(spec: &str, a: &[f64], sa: &[usize], b: &[f64], sb: &[usize]) -> (Vec<f64>, Vec<usize>) {
        let (inputs, output) = spec.split_once("->").unwrap();
        let (left, right) = inputs.split_once(',').unwrap();
        let (left, right, output) =
            (left.chars().collect_vec(), right.chars().collect_vec(), output.chars().collect_vec());

        let mut extents: HashMap<char, usize> = left.iter().copied().zip(sa.iter().copied()).collect();
        extents.extend(right.iter().copied().zip(sb.iter().copied()));
        let labels = extents.keys().copied().sorted().collect_vec();
        let out_shape = output.iter().map(|c| extents[c]).collect_vec();
        let mut out = vec![0.0; out_shape.iter().product()];

        let ranges = labels.iter().map(|c| 0..extents[c]).collect_vec();
        for values in ranges.into_iter().multi_cartesian_product() {
            let value_of = |c: &char| values[labels.iter().position(|l| l == c).unwrap()];
            let ia = left.iter().map(value_of).collect_vec();
            let ib = right.iter().map(value_of).collect_vec();
            let io = output.iter().map(value_of).collect_vec();
            out[row_major_offset(&io, &out_shape)] +=
                a[row_major_offset(&ia, sa)] * b[row_major_offset(&ib, sb)];
        }
        (out, out_shape)
    }

    fn check_against_reference(spec: &str, sa: &[usize], sb: &[usize], expected_plan: ContractionPlan) {
        let engine = ContractionEngine::new();
        let (a, data_a) = random_tensor(sa, 11);
        let (b, data_b) = random_tensor(sb, 29);

        assert_eq!(engine.plan(spec).unwrap().plan, expected_plan, "plan of `{spec}`");

        let c = engine.contract(spec, a.view(), b.view(), None).unwrap();
        let (data_c, shape_c) = reference_einsum(spec, &data_a, sa, &data_b, sb);
        assert_eq!(c.shape().to_vec(), shape_c, "shape of `{spec}`");

        let c_ref: Tsr = rt::asarray((data_c, shape_c.c(), &DeviceTsr::default()));
        assert!((c - c_ref).abs().max_all() < 1.0e-10, "values of `{spec}`");
    }

    #[test]
    fn test_plain_multiply() {
        check_against_reference("abcd,cdef->abef", &[4, 4, 4, 4], &[4, 4, 4, 4], ContractionPlan::Plain);
        check_against_reference("cd,cdef->ef", &[4, 4], &[4, 4, 4, 4], ContractionPlan::Plain);
        check_against_reference("ij,jk->ik", &[3, 5], &[5, 2], ContractionPlan::Plain);
    }

    #[test]
    fn test_transposed_multiply() {
        check_against_reference("cdab,efcd->abef", &[4, 3, 2, 5], &[2, 3, 4, 3], ContractionPlan::BothTransposed);
        check_against_reference("abcd,efcd->abef", &[2, 3, 4, 5], &[3, 2, 4, 5], ContractionPlan::RightTransposed);
        check_against_reference("mnab,mnij->ijab", &[4, 4, 4, 4], &[4, 4, 4, 4], ContractionPlan::LeftTransposed);
    }

    #[test]
    fn test_fallback_summation() {
        check_against_reference("ce,cdef->df", &[4, 4], &[4, 4, 4, 4], ContractionPlan::FallbackSummation);
        check_against_reference("nf,naif->ia", &[4, 4], &[4, 4, 4, 4], ContractionPlan::FallbackSummation);
        check_against_reference("ijab,ia->jb", &[2, 3, 4, 5], &[2, 4], ContractionPlan::FallbackSummation);
    }

    #[test]
    fn test_general_multi_axis() {
        check_against_reference("acbd,cdef->abef", &[4, 4, 4, 4], &[4, 4, 4, 4], ContractionPlan::GeneralMultiAxis);
        check_against_reference("acbd,cdef->abfe", &[4, 4, 4, 4], &[4, 4, 4, 4], ContractionPlan::GeneralMultiAxis);
        check_against_reference("pvkl,vq->pqkl", &[3, 4, 2, 5], &[4, 3], ContractionPlan::GeneralMultiAxis);
    }

    #[test]
    fn test_outer_product_and_permutation() {
        check_against_reference("ia,jb->ijab", &[2, 3], &[4, 5], ContractionPlan::Plain);
        check_against_reference("jf,nb->jnfb", &[2, 3], &[4, 5], ContractionPlan::Plain);
    }

    #[test]
    fn test_full_contraction_to_scalar() {
        let engine = ContractionEngine::new();
        let (a, data_a) = random_tensor(&[3, 4], 5);
        let (b, data_b) = random_tensor(&[3, 4], 7);

        let c = engine.contract("ia,ia->", a.view(), b.view(), None).unwrap();
        assert_eq!(c.shape().len(), 0);
        let expected: f64 = data_a.iter().zip(&data_b).map(|(x, y)| x * y).sum();
        assert!((c.to_scalar() - expected).abs() < 1.0e-12);

        let (b, data_b) = random_tensor(&[4, 3], 7);
        let c = engine.contract("ia,ai->", a.view(), b.view(), None).unwrap();
        let (expected, _) = reference_einsum("ia,ai->", &data_a, &[3, 4], &data_b, &[4, 3]);
        assert!((c.to_scalar() - expected[0]).abs() < 1.0e-12);
    }

    #[test]
    fn test_scale() {
        let engine = ContractionEngine::new();
        let (a, _) = random_tensor(&[4, 4, 4, 4], 3);
        let (b, _) = random_tensor(&[4, 4], 4);

        for spec in ["abcd,cd->ab", "abcd,ec->abed", "cdab,cd->ab", "abcd,ac->bd"] {
            let base = engine.contract(spec, a.view(), b.view(), None).unwrap();
            for scale in [0.0, -0.5, 0.25, 3.0] {
                let scaled = engine.contract(spec, a.view(), b.view(), Some(scale)).unwrap();
                assert!((scaled - scale * &base).abs().max_all() < 1.0e-12, "`{spec}` scaled by {scale}");
            }
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let engine = ContractionEngine::new();
        let (a, _) = random_tensor(&[4, 3], 1);
        let (b, _) = random_tensor(&[4, 4, 4, 4], 2);

        let err = engine.contract("ce,cdef->df", a.view(), b.view(), None).unwrap_err();
        assert!(matches!(err, CCError::ShapeMismatch { .. }));

        let err = engine.contract("cde,cdef->f", a.view(), b.view(), None).unwrap_err();
        assert!(matches!(err, CCError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_invalid_specs() {
        for spec in ["ab,bc", "ab->a", "ab,bc,cd->ad", "aab,bc->ac", "ab,bc->ax", "ab,bc->abc", "ab,bc->a", "ab,bc->cc"] {
            let err = ContractionSpec::parse(spec).unwrap_err();
            assert!(matches!(err, CCError::InvalidContraction { .. }), "`{spec}` should be rejected");
        }
    }

    #[test]
    fn test_plan_cache() {
        let engine = ContractionEngine::new();
        let (a, _) = random_tensor(&[3, 3], 1);
        let (b, _) = random_tensor(&[3, 3], 2);
        for _ in 0..4 {
            engine.contract("ij,jk->ik", a.view(), b.view(), None).unwrap();
            engine.contract("ij,kj->ik", a.view(), b.view(), None).unwrap();
        }
        assert_eq!(engine.cached_plans(), 2);
        assert!(Arc::ptr_eq(&engine.plan("ij,jk->ik").unwrap(), &engine.plan("ij,jk->ik").unwrap()));
    }
}
