#![allow(unused)]

/* #region for API callers */

pub use crate::ccsd::CCSDEngine;
pub use crate::contract::{ContractionEngine, ContractionPlan, ContractionSpec};
pub use crate::error::CCError;
pub use crate::reference::ReferenceData;
pub use crate::structs::{CCSDAmplitudes, CCSDConfig, CCSDIntermediates, CCSDResults, CCSDStage, SpinReferenceInput};

/* #endregion */

/* #region for developers */

// RSTSR backend specification
#[cfg(not(feature = "use_openblas"))]
pub type DeviceTsr = DeviceFaer;
#[cfg(feature = "use_openblas")]
pub type DeviceTsr = DeviceOpenBLAS;

pub(crate) use rayon::prelude::*;
pub(crate) use rstsr::prelude::*;
pub(crate) use tracing::{debug, info, trace, warn};

pub(crate) use crate::*;

pub type Tsr<D = IxD> = Tensor<f64, DeviceTsr, D>;
pub type TsrView<'a, D = IxD> = TensorView<'a, f64, DeviceTsr, D>;
pub type TsrMut<'a, D = IxD> = TensorMut<'a, f64, DeviceTsr, D>;

/* #endregion */
