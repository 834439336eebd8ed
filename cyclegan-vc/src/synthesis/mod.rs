//! Conversion of whole utterances with a trained model
//!
//! Used by the training loop to write converted validation audio at fixed
//! epoch intervals.

mod validation;

pub use validation::{validation_output_dir, ValidationReport, ValidationSynthesizer};
