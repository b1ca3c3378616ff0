//! NPY file loading and saving
//!
//! Reads NumPy .npy files written by the pipeline and writes `<f4`
//! files for round-trip fixtures.

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Payload alignment used when writing headers
const HEADER_ALIGNMENT: usize = 64;

/// Element type of an NPY payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpyDtype {
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// 16-bit signed int
    I16,
    /// 32-bit signed int
    I32,
    /// 64-bit signed int
    I64,
    /// 8-bit unsigned int
    U8,
    /// Boolean stored as one byte
    Bool,
}

impl NpyDtype {
    /// Size of one element in bytes
    pub fn size(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
            Self::I16 => 2,
            Self::U8 | Self::Bool => 1,
        }
    }
}

/// NPY array data
#[derive(Debug, Clone)]
pub struct NpyArray {
    /// Shape of the array
    pub shape: Vec<usize>,
    /// Data type string as written in the header (e.g., "<f4", "<i8")
    pub descr: String,
    /// Parsed element type
    pub dtype: NpyDtype,
    /// Whether the payload is stored big-endian
    pub big_endian: bool,
    /// Whether the payload is stored in Fortran (column-major) order
    pub fortran_order: bool,
    /// Raw data bytes
    pub data: Vec<u8>,
}

impl NpyArray {
    /// Get total number of elements
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn words<const N: usize>(&self) -> impl Iterator<Item = [u8; N]> + '_ {
        let big_endian = self.big_endian;
        self.data.chunks_exact(N).map(move |chunk| {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(chunk);
            if big_endian {
                bytes.reverse();
            }
            bytes
        })
    }

    /// Get as f32 vector (requires float32 dtype)
    pub fn as_f32(&self) -> Result<Vec<f32>> {
        if self.dtype != NpyDtype::F32 {
            anyhow::bail!("Expected float32, got {}", self.descr);
        }
        Ok(self.words::<4>().map(f32::from_le_bytes).collect())
    }

    /// Get as i64 vector (requires int64 dtype)
    pub fn as_i64(&self) -> Result<Vec<i64>> {
        if self.dtype != NpyDtype::I64 {
            anyhow::bail!("Expected int64, got {}", self.descr);
        }
        Ok(self.words::<8>().map(i64::from_le_bytes).collect())
    }

    /// Get as i32 vector (requires int32 dtype)
    pub fn as_i32(&self) -> Result<Vec<i32>> {
        if self.dtype != NpyDtype::I32 {
            anyhow::bail!("Expected int32, got {}", self.descr);
        }
        Ok(self.words::<4>().map(i32::from_le_bytes).collect())
    }

    /// Convert any numeric payload to f32, in storage order
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self.dtype {
            NpyDtype::F32 => self.words::<4>().map(f32::from_le_bytes).collect(),
            NpyDtype::F64 => self
                .words::<8>()
                .map(|b| f64::from_le_bytes(b) as f32)
                .collect(),
            NpyDtype::I16 => self
                .words::<2>()
                .map(|b| i16::from_le_bytes(b) as f32)
                .collect(),
            NpyDtype::I32 => self
                .words::<4>()
                .map(|b| i32::from_le_bytes(b) as f32)
                .collect(),
            NpyDtype::I64 => self
                .words::<8>()
                .map(|b| i64::from_le_bytes(b) as f32)
                .collect(),
            NpyDtype::U8 => self.data.iter().map(|&b| b as f32).collect(),
            NpyDtype::Bool => self
                .data
                .iter()
                .map(|&b| if b != 0 { 1.0 } else { 0.0 })
                .collect(),
        }
    }

    /// Convert to an f32 tensor holding the logical (C-order) array
    ///
    /// Fortran-ordered files are reordered so the tensor matches what
    /// NumPy returns from `np.load`.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        let values = self.to_f32_vec();
        if !self.fortran_order || self.shape.len() < 2 {
            return Ok(Tensor::from_vec(values, self.shape.as_slice(), device)?);
        }

        let reversed: Vec<usize> = self.shape.iter().rev().copied().collect();
        let rank = reversed.len();
        let tensor = Tensor::from_vec(values, reversed.as_slice(), device)?;
        let dims: Vec<usize> = (0..rank).rev().collect();
        Ok(tensor.permute(dims)?.contiguous()?)
    }
}

/// Load an NPY file
pub fn load_npy<P: AsRef<Path>>(path: P) -> Result<NpyArray> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open NPY file: {:?}", path))?;
    let mut reader = BufReader::new(file);
    let array = read_npy(&mut reader)
        .with_context(|| format!("Failed to parse NPY file: {:?}", path))?;
    debug!(
        "Loaded {:?}: shape {:?}, dtype {}, fortran_order {}",
        path, array.shape, array.descr, array.fortran_order
    );
    Ok(array)
}

/// Parse an NPY stream
pub fn read_npy<R: Read>(reader: &mut R) -> Result<NpyArray> {
    // Read magic number (6 bytes: \x93NUMPY)
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic).context("Missing NPY magic")?;
    if &magic != NPY_MAGIC {
        anyhow::bail!("Invalid NPY magic number");
    }

    // Read version (2 bytes)
    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let major = version[0];

    // Read header length
    let header_len = match major {
        1 => {
            let mut len_bytes = [0u8; 2];
            reader.read_exact(&mut len_bytes)?;
            u16::from_le_bytes(len_bytes) as usize
        }
        2 | 3 => {
            let mut len_bytes = [0u8; 4];
            reader.read_exact(&mut len_bytes)?;
            u32::from_le_bytes(len_bytes) as usize
        }
        other => anyhow::bail!("Unsupported NPY version {}.{}", other, version[1]),
    };

    let mut header_bytes = vec![0u8; header_len];
    reader
        .read_exact(&mut header_bytes)
        .context("Truncated NPY header")?;
    let header = String::from_utf8_lossy(&header_bytes);

    let descr = parse_descr(&header)?;
    let (dtype, big_endian) = parse_dtype(&descr)?;
    let fortran_order = parse_fortran_order(&header)?;
    let shape = parse_shape(&header)?;

    let data_size = shape
        .iter()
        .try_fold(dtype.size(), |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| anyhow::anyhow!("NPY shape {:?} is too large", shape))?;
    let mut data = Vec::new();
    reader.take(data_size as u64).read_to_end(&mut data)?;
    if data.len() != data_size {
        anyhow::bail!(
            "Truncated NPY payload: expected {} bytes, got {}",
            data_size,
            data.len()
        );
    }

    Ok(NpyArray {
        shape,
        descr,
        dtype,
        big_endian,
        fortran_order,
        data,
    })
}

/// Load an NPY file as a rank-2 f32 tensor
///
/// A 1-D array of length n is returned as an (n, 1) column.
pub fn load_npy_matrix<P: AsRef<Path>>(path: P, device: &Device) -> Result<Tensor> {
    let path = path.as_ref();
    let array = load_npy(path)?;
    let tensor = array.to_tensor(device)?;
    match array.shape.as_slice() {
        [n] => Ok(tensor.reshape((*n, 1))?),
        [_, _] => Ok(tensor),
        other => anyhow::bail!("Expected a matrix in {:?}, got shape {:?}", path, other),
    }
}

/// Load NPY file as f32 vector
pub fn load_npy_f32<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, Vec<usize>)> {
    let arr = load_npy(path)?;
    let data = arr.as_f32()?;
    Ok((data, arr.shape))
}

/// Save f32 data as a C-order `<f4` NPY file
pub fn save_npy_f32<P: AsRef<Path>>(path: P, data: &[f32], shape: &[usize]) -> Result<()> {
    let path = path.as_ref();
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        anyhow::bail!(
            "Shape {:?} needs {} elements, got {}",
            shape,
            expected,
            data.len()
        );
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create NPY file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&encode_header(shape))?;
    for value in data {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Save a tensor as a C-order `<f4` NPY file
pub fn save_tensor<P: AsRef<Path>>(path: P, tensor: &Tensor) -> Result<()> {
    let data: Vec<f32> = tensor
        .to_dtype(candle_core::DType::F32)?
        .flatten_all()?
        .to_vec1()?;
    save_npy_f32(path, &data, tensor.dims())
}

/// Build a version 1.0 header, padded so the payload is aligned
fn encode_header(shape: &[usize]) -> Vec<u8> {
    let shape_str = match shape {
        [single] => format!("({},)", single),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}",
        shape_str
    );

    // magic (6) + version (2) + length (2) + dict + newline
    let unpadded = NPY_MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (HEADER_ALIGNMENT - unpadded % HEADER_ALIGNMENT) % HEADER_ALIGNMENT;
    dict.push_str(&" ".repeat(padding));
    dict.push('\n');

    let mut header = Vec::with_capacity(unpadded + padding);
    header.extend_from_slice(NPY_MAGIC);
    header.extend_from_slice(&[1, 0]);
    header.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    header.extend_from_slice(dict.as_bytes());
    header
}

/// Find the value that follows `'key':` in the header dict
fn header_value<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    let start = header
        .find(&format!("'{}'", key))
        .or_else(|| header.find(&format!("\"{}\"", key)))
        .ok_or_else(|| anyhow::anyhow!("No {} in header", key))?;

    let rest = &header[start..];
    let colon = rest
        .find(':')
        .ok_or_else(|| anyhow::anyhow!("No colon after {}", key))?;
    Ok(rest[colon + 1..].trim_start())
}

/// Parse the descr string from NPY header
fn parse_descr(header: &str) -> Result<String> {
    let after_colon = header_value(header, "descr")?;
    let quote_char = after_colon
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| anyhow::anyhow!("No dtype string"))?;
    let body = &after_colon[1..];
    let end = body
        .find(quote_char)
        .ok_or_else(|| anyhow::anyhow!("Unclosed dtype string"))?;

    Ok(body[..end].to_string())
}

/// Map a descr string to an element type and byte order
fn parse_dtype(descr: &str) -> Result<(NpyDtype, bool)> {
    let (big_endian, code) = match descr.chars().next() {
        Some('>') => (true, &descr[1..]),
        Some('<') | Some('|') | Some('=') => (false, &descr[1..]),
        _ => (false, descr),
    };

    let dtype = match code {
        "f4" => NpyDtype::F32,
        "f8" => NpyDtype::F64,
        "i2" => NpyDtype::I16,
        "i4" => NpyDtype::I32,
        "i8" => NpyDtype::I64,
        "u1" => NpyDtype::U8,
        "b1" => NpyDtype::Bool,
        _ => anyhow::bail!("Unsupported dtype: {}", descr),
    };

    Ok((dtype, big_endian))
}

/// Parse fortran_order flag from NPY header
fn parse_fortran_order(header: &str) -> Result<bool> {
    let value = header_value(header, "fortran_order")?;
    if value.starts_with("True") {
        Ok(true)
    } else if value.starts_with("False") {
        Ok(false)
    } else {
        anyhow::bail!("Invalid fortran_order value")
    }
}

/// Parse shape from NPY header
fn parse_shape(header: &str) -> Result<Vec<usize>> {
    let rest = header_value(header, "shape")?;
    let paren_start = rest
        .find('(')
        .ok_or_else(|| anyhow::anyhow!("No shape tuple"))?;
    let paren_end = rest
        .find(')')
        .ok_or_else(|| anyhow::anyhow!("Unclosed shape tuple"))?;

    rest[paren_start + 1..paren_end]
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<usize>()
                .map_err(|e| anyhow::anyhow!("Invalid shape element: {}", e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn npy_bytes(dict: &str, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(NPY_MAGIC);
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_parse_descr() {
        let header = "{'descr': '<f4', 'fortran_order': False, 'shape': (1, 2, 3)}";
        assert_eq!(parse_descr(header).unwrap(), "<f4");
    }

    #[test]
    fn test_parse_dtype_big_endian() {
        assert_eq!(parse_dtype(">f8").unwrap(), (NpyDtype::F64, true));
        assert_eq!(parse_dtype("|b1").unwrap(), (NpyDtype::Bool, false));
        assert!(parse_dtype("<c8").is_err());
    }

    #[test]
    fn test_parse_shape() {
        let header = "{'descr': '<f4', 'fortran_order': False, 'shape': (1, 2, 3)}";
        assert_eq!(parse_shape(header).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_shape_1d() {
        let header = "{'descr': '<i8', 'fortran_order': False, 'shape': (100,)}";
        assert_eq!(parse_shape(header).unwrap(), vec![100]);
    }

    #[test]
    fn test_parse_fortran_order() {
        let header = "{'descr': '<f4', 'fortran_order': True, 'shape': (2, 2)}";
        assert!(parse_fortran_order(header).unwrap());
    }

    #[test]
    fn test_npy_array_as_i64() {
        let data: Vec<u8> = [1i64, 2, 3].iter().flat_map(|i| i.to_le_bytes()).collect();
        let arr = NpyArray {
            shape: vec![3],
            descr: "<i8".to_string(),
            dtype: NpyDtype::I64,
            big_endian: false,
            fortran_order: false,
            data,
        };

        assert_eq!(arr.as_i64().unwrap(), vec![1, 2, 3]);
        assert!(arr.as_f32().is_err());
        assert_eq!(arr.to_f32_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_read_big_endian_f64() {
        let payload: Vec<u8> = [1.5f64, -2.0].iter().flat_map(|f| f.to_be_bytes()).collect();
        let bytes = npy_bytes("{'descr': '>f8', 'fortran_order': False, 'shape': (2,), }\n", &payload);
        let arr = read_npy(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(arr.to_f32_vec(), vec![1.5, -2.0]);
    }

    #[test]
    fn test_fortran_order_tensor() {
        // logical [[1, 2, 3], [4, 5, 6]] stored column by column
        let payload: Vec<u8> = [1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        let bytes = npy_bytes("{'descr': '<f4', 'fortran_order': True, 'shape': (2, 3), }\n", &payload);
        let arr = read_npy(&mut Cursor::new(bytes)).unwrap();
        let tensor = arr.to_tensor(&Device::Cpu).unwrap();
        assert_eq!(
            tensor.to_vec2::<f32>().unwrap(),
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]
        );
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = npy_bytes("{'descr': '<f4', 'fortran_order': False, 'shape': (4,), }\n", &[0u8; 8]);
        assert!(read_npy(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_oversized_shape_is_an_error() {
        let bytes = npy_bytes(
            "{'descr': '<f4', 'fortran_order': False, 'shape': (4611686018427387904, 4), }\n",
            &[0u8; 16],
        );
        let err = read_npy(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_read_v2_header() {
        let dict = "{'descr': '<f4', 'fortran_order': False, 'shape': (2, 2), }\n";
        let mut bytes = Vec::new();
        bytes.extend_from_slice(NPY_MAGIC);
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&(dict.len() as u32).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        for value in [1.0f32, 2.0, 3.0, 4.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let arr = read_npy(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(arr.shape, vec![2, 2]);
        assert_eq!(arr.as_f32().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_bad_magic() {
        let bytes = b"NOTNPY\x01\x00".to_vec();
        assert!(read_npy(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_header_is_aligned() {
        let header = encode_header(&[89250, 500]);
        assert_eq!(header.len() % HEADER_ALIGNMENT, 0);
        assert_eq!(*header.last().unwrap(), b'\n');
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.npy");
        let values = vec![0.5f32, -1.25, 3.0, 7.75, 0.0, f32::MIN_POSITIVE];
        save_npy_f32(&path, &values, &[3, 2]).unwrap();

        let (loaded, shape) = load_npy_f32(&path).unwrap();
        assert_eq!(shape, vec![3, 2]);
        assert_eq!(loaded, values);
    }

    #[test]
    fn test_save_rejects_wrong_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.npy");
        assert!(save_npy_f32(&path, &[1.0, 2.0, 3.0], &[2, 2]).is_err());
    }

    #[test]
    fn test_load_matrix_promotes_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bias.npy");
        save_npy_f32(&path, &[1.0, 2.0, 3.0], &[3]).unwrap();
        let matrix = load_npy_matrix(&path, &Device::Cpu).unwrap();
        assert_eq!(matrix.dims(), &[3, 1]);
    }
}
