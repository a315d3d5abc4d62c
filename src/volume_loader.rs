use crate::volume::{Dims, VolumeBuffer, VolumeError};

use std::path::Path;
use thiserror::Error;

/// Datatype code selecting 32-bit float storage; any other code is read as 64-bit float.
pub const DATATYPE_FLOAT32: i16 = 16;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Not a recognized volume: {0}")]
    Unrecognized(String),

    #[error("Invalid volume dimensions {0:?}")]
    InvalidDims([usize; 4]),

    #[error("Scalar data of {len} bytes is not a whole number of {width}-byte samples")]
    Truncated { len: usize, width: usize },

    #[error("Volume error: {0}")]
    Volume(#[from] VolumeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output of a file decoder: header dimensions, storage code and raw scalar bytes.
///
/// `dims[0]` is a leading channel entry; the spatial extents are `dims[1..4]`.
#[derive(Clone, Debug)]
pub struct DecodedVolume {
    pub dims: [usize; 4],
    pub datatype_code: i16,
    pub data: Vec<u8>,
}

/// Turns the bytes of one uploaded file into a [`DecodedVolume`].
pub trait VolumeDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedVolume, VolumeLoaderError>;
}

/// Decoder for headerless native-endian sample dumps of known extent.
#[derive(Clone, Copy, Debug)]
pub struct RawVolumeDecoder {
    pub dims: Dims,
    pub datatype_code: i16,
}

impl VolumeDecoder for RawVolumeDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedVolume, VolumeLoaderError> {
        Ok(DecodedVolume {
            dims: [1, self.dims.nx, self.dims.ny, self.dims.nz],
            datatype_code: self.datatype_code,
            data: bytes.to_vec(),
        })
    }
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Build a volume from decoder output
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions are empty or the scalar byte count
    /// does not match them. Nothing is produced on failure.
    pub fn load_from_decoded(decoded: &DecodedVolume) -> Result<VolumeBuffer, VolumeLoaderError> {
        let [_, nx, ny, nz] = decoded.dims;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(VolumeLoaderError::InvalidDims(decoded.dims));
        }

        let scalars = Self::decode_scalars(&decoded.data, decoded.datatype_code)?;
        let volume = VolumeBuffer::from_scalars(Dims::new(nx, ny, nz), scalars)?;
        log::debug!(
            "Decoded {}x{}x{} volume (datatype {}), range {:?}",
            nx,
            ny,
            nz,
            decoded.datatype_code,
            volume.value_range()
        );
        Ok(volume)
    }

    pub fn load_from_bytes(
        bytes: &[u8],
        decoder: &impl VolumeDecoder,
    ) -> Result<VolumeBuffer, VolumeLoaderError> {
        let decoded = decoder.decode(bytes)?;
        Self::load_from_decoded(&decoded)
    }

    /// Read and decode a volume file without blocking the caller's thread
    pub async fn load_from_path(
        path: impl AsRef<Path>,
        decoder: &impl VolumeDecoder,
    ) -> Result<VolumeBuffer, VolumeLoaderError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        log::info!("Read {} ({} bytes)", path.display(), bytes.len());
        Self::load_from_bytes(&bytes, decoder)
    }

    fn decode_scalars(data: &[u8], datatype_code: i16) -> Result<Vec<f64>, VolumeLoaderError> {
        if datatype_code == DATATYPE_FLOAT32 {
            Self::check_width(data, size_of::<f32>())?;
            let samples: Vec<f32> = bytemuck::pod_collect_to_vec(data);
            Ok(samples.into_iter().map(f64::from).collect())
        } else {
            Self::check_width(data, size_of::<f64>())?;
            Ok(bytemuck::pod_collect_to_vec(data))
        }
    }

    fn check_width(data: &[u8], width: usize) -> Result<(), VolumeLoaderError> {
        if data.len() % width != 0 {
            return Err(VolumeLoaderError::Truncated {
                len: data.len(),
                width,
            });
        }
        Ok(())
    }
}
