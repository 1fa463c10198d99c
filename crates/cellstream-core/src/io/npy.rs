use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::{Mmap, MmapMut};
use ndarray::{Array3, ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3, Axis};

use crate::consts::NPY_HEADER_ALIGN;
use crate::error::{CellstreamError, Result};
use crate::frame::StackShape;

pub(crate) const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Magic (6) + version (2) + header length (2).
const NPY_PREAMBLE_SIZE: usize = 10;

/// Element types that can be stored in a stack file.
///
/// `u8` is reserved for masks and is written as numpy `bool`.
pub trait NpyElement: bytemuck::Pod + Send + Sync {
    const DESCR: &'static str;
}

impl NpyElement for u8 {
    const DESCR: &'static str = "|b1";
}

impl NpyElement for u16 {
    const DESCR: &'static str = "<u2";
}

impl NpyElement for u32 {
    const DESCR: &'static str = "<u4";
}

impl NpyElement for f32 {
    const DESCR: &'static str = "<f4";
}

/// Parsed npy header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NpyHeader {
    pub descr: String,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
    /// Byte offset of the first array element.
    pub data_offset: usize,
}

impl NpyHeader {
    /// Shape as a 3D stack, or an error for any other rank.
    pub fn stack_shape(&self) -> Result<StackShape> {
        match self.shape.as_slice() {
            &[t, h, w] => Ok(StackShape::new(t, h, w)),
            other => Err(CellstreamError::InvalidNpy(format!(
                "expected a 3D stack, found shape {:?}",
                other
            ))),
        }
    }

    fn ensure_descr<T: NpyElement>(&self) -> Result<()> {
        if self.descr != T::DESCR {
            return Err(CellstreamError::DtypeMismatch {
                expected: T::DESCR.into(),
                found: self.descr.clone(),
            });
        }
        if self.fortran_order {
            return Err(CellstreamError::InvalidNpy(
                "Fortran-ordered arrays are not supported".into(),
            ));
        }
        Ok(())
    }
}

/// Read only the header of an npy file.
pub fn read_header(path: &Path) -> Result<NpyHeader> {
    let mut file = open_existing(path)?;
    let mut preamble = [0u8; NPY_PREAMBLE_SIZE];
    file.read_exact(&mut preamble)?;
    let header_len = check_preamble(&preamble)?;
    let mut dict = vec![0u8; header_len];
    file.read_exact(&mut dict)?;
    parse_dict(&dict, NPY_PREAMBLE_SIZE + header_len)
}

/// Read-only memory-mapped 3D stack.
pub struct NpyStack<T: NpyElement> {
    mmap: Mmap,
    shape: StackShape,
    offset: usize,
    _marker: PhantomData<T>,
}

impl<T: NpyElement> NpyStack<T> {
    /// Open a stack file and validate its dtype and size.
    pub fn open(path: &Path) -> Result<Self> {
        let file = open_existing(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let header = parse_mapped_header(&mmap)?;
        header.ensure_descr::<T>()?;
        let shape = header.stack_shape()?;
        ensure_len::<T>(mmap.len(), header.data_offset, shape)?;
        Ok(Self {
            mmap,
            shape,
            offset: header.data_offset,
            _marker: PhantomData,
        })
    }

    pub fn shape(&self) -> StackShape {
        self.shape
    }

    /// Zero-copy view of the whole stack.
    pub fn view(&self) -> Result<ArrayView3<'_, T>> {
        let bytes = &self.mmap[self.offset..self.offset + byte_len::<T>(self.shape)];
        let data: &[T] = bytemuck::try_cast_slice(bytes)
            .map_err(|e| CellstreamError::InvalidNpy(format!("misaligned data: {e}")))?;
        ArrayView3::from_shape(self.shape.dim(), data)
            .map_err(|e| CellstreamError::InvalidNpy(e.to_string()))
    }

    /// Zero-copy view of one frame.
    pub fn frame(&self, index: usize) -> Result<ArrayView2<'_, T>> {
        if index >= self.shape.frames {
            return Err(CellstreamError::InvalidParameter(format!(
                "frame {index} out of range (total: {})",
                self.shape.frames
            )));
        }
        Ok(self.view()?.index_axis_move(Axis(0), index))
    }

    /// Copy the whole stack into memory.
    pub fn to_owned(&self) -> Result<Array3<T>> {
        Ok(self.view()?.to_owned())
    }
}

/// Writable memory-mapped 3D stack. The mapping is owned by a single writer
/// until it is flushed and dropped.
pub struct NpyStackMut<T: NpyElement> {
    mmap: MmapMut,
    shape: StackShape,
    offset: usize,
    _marker: PhantomData<T>,
}

impl<T: NpyElement> NpyStackMut<T> {
    /// Create (or truncate) a zero-filled stack file of the given shape.
    pub fn create(path: &Path, shape: StackShape) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(&file);
        let offset = write_header(&mut writer, T::DESCR, shape)?;
        writer.flush()?;
        drop(writer);
        file.set_len((offset + byte_len::<T>(shape)) as u64)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            mmap,
            shape,
            offset,
            _marker: PhantomData,
        })
    }

    /// Map an existing stack file for in-place modification.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CellstreamError::MissingInput(path.to_path_buf()));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let header = parse_mapped_header(&mmap)?;
        header.ensure_descr::<T>()?;
        let shape = header.stack_shape()?;
        ensure_len::<T>(mmap.len(), header.data_offset, shape)?;
        Ok(Self {
            mmap,
            shape,
            offset: header.data_offset,
            _marker: PhantomData,
        })
    }

    pub fn shape(&self) -> StackShape {
        self.shape
    }

    pub fn view(&self) -> Result<ArrayView3<'_, T>> {
        let bytes = &self.mmap[self.offset..self.offset + byte_len::<T>(self.shape)];
        let data: &[T] = bytemuck::try_cast_slice(bytes)
            .map_err(|e| CellstreamError::InvalidNpy(format!("misaligned data: {e}")))?;
        ArrayView3::from_shape(self.shape.dim(), data)
            .map_err(|e| CellstreamError::InvalidNpy(e.to_string()))
    }

    pub fn view_mut(&mut self) -> Result<ArrayViewMut3<'_, T>> {
        let len = byte_len::<T>(self.shape);
        let bytes = &mut self.mmap[self.offset..self.offset + len];
        let data: &mut [T] = bytemuck::try_cast_slice_mut(bytes)
            .map_err(|e| CellstreamError::InvalidNpy(format!("misaligned data: {e}")))?;
        ArrayViewMut3::from_shape(self.shape.dim(), data)
            .map_err(|e| CellstreamError::InvalidNpy(e.to_string()))
    }

    pub fn frame_mut(&mut self, index: usize) -> Result<ArrayViewMut2<'_, T>> {
        if index >= self.shape.frames {
            return Err(CellstreamError::InvalidParameter(format!(
                "frame {index} out of range (total: {})",
                self.shape.frames
            )));
        }
        Ok(self.view_mut()?.index_axis_move(Axis(0), index))
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}

/// Write an in-memory stack to a new npy file.
pub fn write_stack<T: NpyElement>(path: &Path, data: ArrayView3<'_, T>) -> Result<()> {
    let mut out = NpyStackMut::<T>::create(path, StackShape::from_dim(data.dim()))?;
    out.view_mut()?.assign(&data);
    out.flush()
}

/// Read a whole npy stack into memory.
pub fn read_stack<T: NpyElement>(path: &Path) -> Result<Array3<T>> {
    NpyStack::<T>::open(path)?.to_owned()
}

fn open_existing(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(CellstreamError::MissingInput(path.to_path_buf()));
    }
    Ok(File::open(path)?)
}

fn byte_len<T: NpyElement>(shape: StackShape) -> usize {
    shape.len() * std::mem::size_of::<T>()
}

fn ensure_len<T: NpyElement>(file_len: usize, offset: usize, shape: StackShape) -> Result<()> {
    let expected = offset + byte_len::<T>(shape);
    if file_len < expected {
        return Err(CellstreamError::InvalidNpy(format!(
            "File truncated: expected at least {} bytes, got {}",
            expected, file_len
        )));
    }
    Ok(())
}

fn check_preamble(preamble: &[u8]) -> Result<usize> {
    if preamble.len() < NPY_PREAMBLE_SIZE || &preamble[0..6] != NPY_MAGIC {
        return Err(CellstreamError::InvalidNpy("Missing NUMPY magic".into()));
    }
    if preamble[6] != 1 {
        return Err(CellstreamError::InvalidNpy(format!(
            "Unsupported npy version {}.{}",
            preamble[6], preamble[7]
        )));
    }
    let mut cursor = std::io::Cursor::new(&preamble[8..NPY_PREAMBLE_SIZE]);
    Ok(cursor.read_u16::<LittleEndian>()? as usize)
}

fn parse_mapped_header(bytes: &[u8]) -> Result<NpyHeader> {
    if bytes.len() < NPY_PREAMBLE_SIZE {
        return Err(CellstreamError::InvalidNpy(
            "File too small for npy header".into(),
        ));
    }
    let header_len = check_preamble(&bytes[..NPY_PREAMBLE_SIZE])?;
    let end = NPY_PREAMBLE_SIZE + header_len;
    if bytes.len() < end {
        return Err(CellstreamError::InvalidNpy("Header truncated".into()));
    }
    parse_dict(&bytes[NPY_PREAMBLE_SIZE..end], end)
}

/// Parse the Python-literal header dict, e.g.
/// `{'descr': '<u2', 'fortran_order': False, 'shape': (3, 64, 64), }`.
fn parse_dict(raw: &[u8], data_offset: usize) -> Result<NpyHeader> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| CellstreamError::InvalidNpy("Header is not valid text".into()))?;

    let descr = dict_value(text, "descr")?
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string();

    let fortran_order = match dict_value(text, "fortran_order")? {
        "True" => true,
        "False" => false,
        other => {
            return Err(CellstreamError::InvalidNpy(format!(
                "Invalid fortran_order value {other:?}"
            )))
        }
    };

    let shape_text = dict_value(text, "shape")?;
    let shape = shape_text
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| CellstreamError::InvalidNpy(format!("Invalid shape entry {s:?}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(NpyHeader {
        descr,
        fortran_order,
        shape,
        data_offset,
    })
}

/// Extract the raw literal that follows `'key':` up to the next top-level comma.
fn dict_value<'a>(text: &'a str, key: &str) -> Result<&'a str> {
    let pattern = format!("'{key}':");
    let start = text
        .find(&pattern)
        .map(|i| i + pattern.len())
        .ok_or_else(|| CellstreamError::InvalidNpy(format!("Header missing '{key}'")))?;
    let rest = text[start..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')').map(|i| i + 1)
    } else {
        rest.find([',', '}'])
    }
    .ok_or_else(|| CellstreamError::InvalidNpy(format!("Unterminated value for '{key}'")))?;
    Ok(rest[..end].trim())
}

/// Write the preamble and padded dict. Returns the data offset.
fn write_header(w: &mut impl Write, descr: &str, shape: StackShape) -> Result<usize> {
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}, {}, {}), }}",
        descr, shape.frames, shape.height, shape.width
    );
    // Dict + padding + trailing newline must end on an aligned boundary.
    let unpadded = NPY_PREAMBLE_SIZE + dict.len() + 1;
    let padding = (NPY_HEADER_ALIGN - unpadded % NPY_HEADER_ALIGN) % NPY_HEADER_ALIGN;
    let header_len = dict.len() + padding + 1;
    let header_len_u16 = u16::try_from(header_len)
        .map_err(|_| CellstreamError::InvalidNpy("Header too long".into()))?;

    w.write_all(NPY_MAGIC)?;
    w.write_all(&[1, 0])?;
    w.write_u16::<LittleEndian>(header_len_u16)?;
    w.write_all(dict.as_bytes())?;
    w.write_all(&vec![b' '; padding])?;
    w.write_all(b"\n")?;

    Ok(NPY_PREAMBLE_SIZE + header_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_aligned() {
        let mut buf = Vec::new();
        let offset = write_header(&mut buf, "<u2", StackShape::new(3, 64, 64)).unwrap();
        assert_eq!(offset % NPY_HEADER_ALIGN, 0);
        assert_eq!(buf.len(), offset);
        assert_eq!(buf[offset - 1], b'\n');
    }

    #[test]
    fn test_parse_written_header() {
        let mut buf = Vec::new();
        let offset = write_header(&mut buf, "<f4", StackShape::new(10, 512, 256)).unwrap();
        let header = parse_mapped_header(&buf).unwrap();
        assert_eq!(header.descr, "<f4");
        assert!(!header.fortran_order);
        assert_eq!(header.shape, vec![10, 512, 256]);
        assert_eq!(header.data_offset, offset);
    }

    #[test]
    fn test_parse_numpy_style_dict() {
        let dict = b"{'descr': '|b1', 'fortran_order': False, 'shape': (2, 3, 4), }   \n";
        let header = parse_dict(dict, 128).unwrap();
        assert_eq!(header.descr, "|b1");
        assert_eq!(header.stack_shape().unwrap(), StackShape::new(2, 3, 4));
    }

    #[test]
    fn test_rejects_2d_shape() {
        let dict = b"{'descr': '<u2', 'fortran_order': False, 'shape': (3, 4), }\n";
        let header = parse_dict(dict, 64).unwrap();
        assert!(header.stack_shape().is_err());
    }

    #[test]
    fn test_bad_magic() {
        let buf = [0u8; 16];
        assert!(parse_mapped_header(&buf).is_err());
    }
}
