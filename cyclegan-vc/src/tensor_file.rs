//! Safetensors-backed storage for named f64 tensors.
//!
//! Used for both statistics archives and model checkpoints.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use safetensors::tensor::{serialize_to_file, Dtype, TensorView};
use safetensors::SafeTensors;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct TensorF64 {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl TensorF64 {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Self {
        Self { shape, data }
    }

    pub fn scalar(value: f64) -> Self {
        Self::new(vec![1], vec![value])
    }

    pub fn vector(data: Vec<f64>) -> Self {
        Self::new(vec![data.len()], data)
    }
}

/// Write named tensors (and optional string metadata) to a safetensors file.
pub fn write_tensors(
    path: impl AsRef<Path>,
    tensors: &BTreeMap<String, TensorF64>,
    metadata: Option<HashMap<String, String>>,
) -> Result<()> {
    let encoded: Vec<(String, Vec<u8>, Vec<usize>)> = tensors
        .iter()
        .map(|(name, t)| {
            let expected: usize = t.shape.iter().product();
            if expected != t.data.len() {
                return Err(Error::model(format!(
                    "tensor {} has {} values for shape {:?}",
                    name,
                    t.data.len(),
                    t.shape
                )));
            }
            let bytes = t.data.iter().flat_map(|v| v.to_le_bytes()).collect();
            Ok((name.clone(), bytes, t.shape.clone()))
        })
        .collect::<Result<_>>()?;

    let views = encoded
        .iter()
        .map(|(name, bytes, shape)| Ok((name.as_str(), TensorView::new(Dtype::F64, shape.clone(), bytes)?)))
        .collect::<Result<Vec<_>>>()?;

    serialize_to_file(views, &metadata, path.as_ref())?;
    Ok(())
}

/// A safetensors file read fully into memory.
#[derive(Debug)]
pub struct TensorFile {
    bytes: Vec<u8>,
}

impl TensorFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        // Validate the header up front
        SafeTensors::deserialize(&bytes)?;
        Ok(Self { bytes })
    }

    pub fn metadata(&self) -> Result<HashMap<String, String>> {
        let (_, metadata) = SafeTensors::read_metadata(&self.bytes)?;
        Ok(metadata.metadata().clone().unwrap_or_default())
    }

    /// Read an F64 tensor by name.
    pub fn tensor(&self, name: &str) -> Result<TensorF64> {
        let st = SafeTensors::deserialize(&self.bytes)?;
        let view = st.tensor(name)?;
        if view.dtype() != Dtype::F64 {
            return Err(Error::model(format!(
                "tensor {} has dtype {:?}, expected F64",
                name,
                view.dtype()
            )));
        }

        let data = view
            .data()
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();

        Ok(TensorF64::new(view.shape().to_vec(), data))
    }
}
