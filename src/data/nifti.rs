// ============================================================
// Layer 4 — NIfTI-1 Codec
// ============================================================
// Decodes single-file NIfTI-1 volumes (.nii, .nii.gz).
//
// File layout:
//   [0..348)        fixed header
//   [348..352)      extension flag (ignored)
//   [vox_offset..)  voxel data, x varies fastest
//
// Header fields we read (byte offset, type):
//     0  sizeof_hdr  i32   always 348, also tells us the byte order
//    40  dim[8]      i16   dim[0] = rank, dim[1..=rank] = extents
//    70  datatype    i16   storage type code
//    72  bitpix      i16   bits per voxel
//   108  vox_offset  f32   start of voxel data
//   112  scl_slope   f32   value = raw * slope + inter
//   116  scl_inter   f32
//   344  magic       [u8;4]  "n+1\0"
//
// Gzip is detected from the first two bytes (1f 8b), so a
// compressed file with a plain .nii name still loads.
//
// Reference: NIfTI-1 data format (nifti1.h)
//            Rust Book §9 (Error Handling)

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::GzDecoder;
use ndarray::{Array3, ShapeBuilder};
use std::{fs, io::Read, path::Path};
use thiserror::Error;

const HEADER_SIZE: usize = 348;
const MAGIC_SINGLE: &[u8; 4] = b"n+1\0";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum NiftiError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("not a NIfTI-1 file (sizeof_hdr is not 348)")]
    NotNifti,

    #[error("unsupported NIfTI magic {0:?}, only single-file n+1 is read")]
    Magic([u8; 4]),

    #[error("unsupported datatype code {0}")]
    DataType(i16),

    #[error("bitpix {bitpix} does not match datatype code {code}")]
    BitPix { code: i16, bitpix: i16 },

    #[error("invalid dimensions {0:?}")]
    Dims(Vec<i16>),

    #[error("expected a 3-D volume, got shape {0:?}")]
    NotThreeD(Vec<usize>),

    #[error("voxel data truncated: need {need} bytes after offset {offset}, have {have}")]
    Truncated { need: usize, offset: usize, have: usize },
}

// ─── DataType ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl DataType {
    pub fn from_code(code: i16) -> Result<Self, NiftiError> {
        Ok(match code {
            2    => DataType::U8,
            4    => DataType::I16,
            8    => DataType::I32,
            16   => DataType::F32,
            64   => DataType::F64,
            256  => DataType::I8,
            512  => DataType::U16,
            768  => DataType::U32,
            1024 => DataType::I64,
            1280 => DataType::U64,
            other => return Err(NiftiError::DataType(other)),
        })
    }

    pub fn code(self) -> i16 {
        match self {
            DataType::U8  => 2,
            DataType::I16 => 4,
            DataType::I32 => 8,
            DataType::F32 => 16,
            DataType::F64 => 64,
            DataType::I8  => 256,
            DataType::U16 => 512,
            DataType::U32 => 768,
            DataType::I64 => 1024,
            DataType::U64 => 1280,
        }
    }

    pub fn size(self) -> usize {
        match self {
            DataType::U8 | DataType::I8   => 1,
            DataType::I16 | DataType::U16 => 2,
            DataType::I32 | DataType::U32 | DataType::F32 => 4,
            DataType::I64 | DataType::U64 | DataType::F64 => 8,
        }
    }
}

// ─── Header ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    pub big_endian: bool,
    /// Extents with trailing singleton axes kept
    pub shape:      Vec<usize>,
    pub datatype:   DataType,
    pub vox_offset: usize,
    pub scl_slope:  f32,
    pub scl_inter:  f32,
}

impl NiftiHeader {
    fn parse<E: ByteOrder>(bytes: &[u8], big_endian: bool) -> Result<Self, NiftiError> {
        let magic: [u8; 4] = [bytes[344], bytes[345], bytes[346], bytes[347]];
        if &magic != MAGIC_SINGLE {
            return Err(NiftiError::Magic(magic));
        }

        let mut dim = [0i16; 8];
        for (i, d) in dim.iter_mut().enumerate() {
            *d = E::read_i16(&bytes[40 + 2 * i..]);
        }
        let rank = dim[0];
        if !(1..=7).contains(&rank) || dim[1..=rank as usize].iter().any(|&d| d < 1) {
            return Err(NiftiError::Dims(dim.to_vec()));
        }
        let shape = dim[1..=rank as usize].iter().map(|&d| d as usize).collect();

        let code     = E::read_i16(&bytes[70..]);
        let datatype = DataType::from_code(code)?;
        let bitpix   = E::read_i16(&bytes[72..]);
        if bitpix as usize != datatype.size() * 8 {
            return Err(NiftiError::BitPix { code, bitpix });
        }

        let vox_offset = E::read_f32(&bytes[108..]);
        let vox_offset = if vox_offset.is_finite() && vox_offset >= HEADER_SIZE as f32 {
            vox_offset as usize
        } else {
            HEADER_SIZE + 4
        };

        Ok(Self {
            big_endian,
            shape,
            datatype,
            vox_offset,
            scl_slope: E::read_f32(&bytes[112..]),
            scl_inter: E::read_f32(&bytes[116..]),
        })
    }

    /// Whether the header asks for `raw * slope + inter`
    pub fn has_scaling(&self) -> bool {
        self.scl_slope.is_finite() && self.scl_slope != 0.0
    }

    /// Shape with trailing singleton axes dropped, required to be 3-D
    pub fn volume_shape(&self) -> Result<[usize; 3], NiftiError> {
        let mut shape = self.shape.clone();
        while shape.len() > 3 && shape.last() == Some(&1) {
            shape.pop();
        }
        match shape.as_slice() {
            &[x, y, z] => Ok([x, y, z]),
            _          => Err(NiftiError::NotThreeD(self.shape.clone())),
        }
    }
}

// ─── Reading ──────────────────────────────────────────────────────────────────
/// Read a 3-D volume, indexed `[x, y, z]`, with scaling applied.
/// Values are returned as-is otherwise: NaN and ±Inf survive.
pub fn read_volume(path: &Path) -> Result<Array3<f32>, NiftiError> {
    let raw   = fs::read(path)?;
    let bytes = decompress(raw)?;
    decode(&bytes)
}

fn decompress(raw: Vec<u8>) -> Result<Vec<u8>, NiftiError> {
    if raw.len() >= 2 && raw[..2] == GZIP_MAGIC {
        let mut out = Vec::new();
        GzDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
        Ok(out)
    } else {
        Ok(raw)
    }
}

/// Decode an uncompressed single-file NIfTI-1 image held in memory.
pub fn decode(bytes: &[u8]) -> Result<Array3<f32>, NiftiError> {
    if bytes.len() < HEADER_SIZE {
        return Err(NiftiError::NotNifti);
    }
    if LittleEndian::read_i32(&bytes[0..4]) == HEADER_SIZE as i32 {
        decode_with::<LittleEndian>(bytes, false)
    } else if BigEndian::read_i32(&bytes[0..4]) == HEADER_SIZE as i32 {
        decode_with::<BigEndian>(bytes, true)
    } else {
        Err(NiftiError::NotNifti)
    }
}

fn decode_with<E: ByteOrder>(bytes: &[u8], big_endian: bool) -> Result<Array3<f32>, NiftiError> {
    let header = NiftiHeader::parse::<E>(bytes, big_endian)?;
    let [x, y, z] = header.volume_shape()?;

    let count = x * y * z;
    let need  = count * header.datatype.size();
    let have  = bytes.len().saturating_sub(header.vox_offset);
    if have < need {
        return Err(NiftiError::Truncated { need, offset: header.vox_offset, have });
    }
    let data = &bytes[header.vox_offset..header.vox_offset + need];

    let raw = decode_voxels::<E>(data, header.datatype);
    let values: Vec<f32> = if header.has_scaling() {
        let slope = header.scl_slope as f64;
        let inter = header.scl_inter as f64;
        raw.into_iter().map(|v| (v * slope + inter) as f32).collect()
    } else {
        raw.into_iter().map(|v| v as f32).collect()
    };

    tracing::debug!(
        "NIfTI {:?} {}x{}x{} ({} endian, scaling: {})",
        header.datatype, x, y, z,
        if big_endian { "big" } else { "little" },
        header.has_scaling(),
    );

    // x is the fastest axis on disk, i.e. column-major for [x, y, z]
    Array3::from_shape_vec((x, y, z).f(), values)
        .map_err(|_| NiftiError::NotThreeD(vec![x, y, z]))
}

fn decode_voxels<E: ByteOrder>(data: &[u8], datatype: DataType) -> Vec<f64> {
    let size = datatype.size();
    let it   = data.chunks_exact(size);
    match datatype {
        DataType::U8  => data.iter().map(|&b| b as f64).collect(),
        DataType::I8  => data.iter().map(|&b| b as i8 as f64).collect(),
        DataType::I16 => it.map(|c| E::read_i16(c) as f64).collect(),
        DataType::U16 => it.map(|c| E::read_u16(c) as f64).collect(),
        DataType::I32 => it.map(|c| E::read_i32(c) as f64).collect(),
        DataType::U32 => it.map(|c| E::read_u32(c) as f64).collect(),
        DataType::I64 => it.map(|c| E::read_i64(c) as f64).collect(),
        DataType::U64 => it.map(|c| E::read_u64(c) as f64).collect(),
        DataType::F32 => it.map(|c| E::read_f32(c) as f64).collect(),
        DataType::F64 => it.map(|c| E::read_f64(c)).collect(),
    }
}
