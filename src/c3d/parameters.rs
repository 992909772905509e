//! Parameter block decoding: the group/parameter record stream that
//! follows the header block, carrying `INFO`, `SUBJECTS`, and `ANALOG`
//! groups.

use super::C3dError;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum ParamValue {
    Strings(Vec<String>),
    Floats(Vec<f32>),
    Bytes(Vec<i8>),
}

impl ParamValue {
    pub fn as_single_string(&self) -> Option<String> {
        match self {
            ParamValue::Strings(v) => v.first().cloned(),
            _ => None,
        }
    }

    pub fn as_single_float(&self) -> Option<f32> {
        match self {
            ParamValue::Floats(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Vec<String> {
        match self {
            ParamValue::Strings(v) => v.clone(),
            _ => Vec::new(),
        }
    }
}

/// `parameters["ANALOG"]["LABELS"]` style lookup, keyed by
/// `(GROUP, PARAMETER)` both upper-cased as C3D convention dictates.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    groups: HashMap<String, HashMap<String, ParamValue>>,
}

impl ParameterTable {
    pub fn get(&self, group: &str, param: &str) -> Option<&ParamValue> {
        self.groups.get(group)?.get(param)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    fn insert(&mut self, group: String, param: String, value: ParamValue) {
        self.groups.entry(group).or_default().insert(param, value);
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn read_i8(&mut self) -> Result<i8, C3dError> {
        let b = *self.buf.get(self.pos).ok_or(C3dError::CorruptFile {
            reason: "parameter stream truncated reading i8".into(),
        })?;
        self.pos += 1;
        Ok(b as i8)
    }

    fn read_u8(&mut self) -> Result<u8, C3dError> {
        Ok(self.read_i8()? as u8)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], C3dError> {
        let slice = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or(C3dError::CorruptFile {
                reason: format!("parameter stream truncated reading {n} bytes"),
            })?;
        self.pos += n;
        Ok(slice)
    }

    fn read_i16(&mut self) -> Result<i16, C3dError> {
        let b = self.read_bytes(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    fn read_f32(&mut self) -> Result<f32, C3dError> {
        let b = self.read_bytes(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Element type byte in a parameter record: -1 char, 1 byte, 2 int16,
/// 4 float (per the C3D group/parameter record layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementType {
    Char,
    Byte,
    Int16,
    Float,
}

impl ElementType {
    fn from_byte(b: i8) -> Result<Self, C3dError> {
        match b {
            -1 => Ok(ElementType::Char),
            1 => Ok(ElementType::Byte),
            2 => Ok(ElementType::Int16),
            4 => Ok(ElementType::Float),
            other => Err(C3dError::CorruptFile {
                reason: format!("unknown parameter element type byte {other}"),
            }),
        }
    }

    fn size_bytes(self) -> usize {
        match self {
            ElementType::Char | ElementType::Byte => 1,
            ElementType::Int16 => 2,
            ElementType::Float => 4,
        }
    }
}

/// Parses the parameter block stream starting right after the 4-byte
/// parameter-block header (processor type byte etc). `group_names`
/// tracks negative group ids -> names so parameters can resolve their
/// owning group.
pub fn parse_parameters(block: &[u8]) -> Result<ParameterTable, C3dError> {
    if block.len() < 4 {
        return Err(C3dError::CorruptFile {
            reason: "parameter block too short".into(),
        });
    }
    // byte0 reserved, byte1 = 0x50 magic, byte2 = block count, byte3 = processor type
    if block[1] != 0x50 {
        return Err(C3dError::CorruptFile {
            reason: format!("bad parameter block magic: {:#04x}", block[1]),
        });
    }

    let mut cursor = Cursor::new(&block[4..]);
    let mut group_names: HashMap<i8, String> = HashMap::new();
    let mut table = ParameterTable::default();

    loop {
        if cursor.remaining() < 2 {
            break;
        }
        let name_len = cursor.read_i8()?;
        if name_len == 0 {
            break;
        }
        let locked = name_len < 0;
        let abs_len = name_len.unsigned_abs() as usize;
        if abs_len == 0 || cursor.remaining() < abs_len {
            break;
        }
        let name_bytes = cursor.read_bytes(abs_len)?;
        let name = String::from_utf8_lossy(name_bytes).trim().to_uppercase();
        let _ = locked;

        let group_id = cursor.read_i8()?;
        let next_offset = cursor.read_i16()?;
        let record_start = cursor.pos;

        if group_id < 0 {
            // Group definition.
            group_names.insert(group_id, name.clone());
            let desc_len = cursor.read_u8().unwrap_or(0) as usize;
            let _ = cursor.read_bytes(desc_len.min(cursor.remaining()));
        } else {
            // Parameter definition belonging to group `-group_id`.
            let owning_group = group_names
                .get(&(-group_id))
                .cloned()
                .unwrap_or_else(|| format!("GROUP_{group_id}"));

            let elem_type_byte = cursor.read_i8()?;
            let elem_type = ElementType::from_byte(elem_type_byte)?;
            let n_dims = cursor.read_u8()? as usize;
            let mut dims = Vec::with_capacity(n_dims);
            for _ in 0..n_dims {
                dims.push(cursor.read_u8()? as usize);
            }

            let total_elements: usize = if dims.is_empty() {
                1
            } else {
                dims.iter().product()
            };

            let value = if elem_type == ElementType::Char {
                // For strings, dims[0] is the string length, any
                // further dims describe an array of strings.
                let str_len = *dims.first().unwrap_or(&0);
                let array_len = if dims.len() > 1 {
                    dims[1..].iter().product::<usize>().max(1)
                } else {
                    1
                };
                let mut strings = Vec::with_capacity(array_len);
                for _ in 0..array_len {
                    let raw = cursor.read_bytes(str_len.min(cursor.remaining()))?;
                    strings.push(String::from_utf8_lossy(raw).trim().to_string());
                }
                ParamValue::Strings(strings)
            } else {
                let byte_len = total_elements * elem_type.size_bytes();
                let raw = cursor.read_bytes(byte_len.min(cursor.remaining()))?;
                match elem_type {
                    ElementType::Float => ParamValue::Floats(
                        raw.chunks_exact(4)
                            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                            .collect(),
                    ),
                    ElementType::Int16 => ParamValue::Floats(
                        raw.chunks_exact(2)
                            .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])))
                            .collect(),
                    ),
                    ElementType::Byte => {
                        ParamValue::Bytes(raw.iter().map(|b| *b as i8).collect())
                    }
                    ElementType::Char => unreachable!(),
                }
            };

            let desc_len = cursor.read_u8().unwrap_or(0) as usize;
            let _ = cursor.read_bytes(desc_len.min(cursor.remaining()));

            table.insert(owning_group, name, value);
        }

        // `next_offset` is relative to right after the 2-byte offset
        // field itself; resync rather than trust our own parsing if
        // they disagree, matching tolerant real-world C3D readers.
        if next_offset <= 0 {
            break;
        }
        let target = (record_start + next_offset as usize).saturating_sub(2);
        if target <= cursor.pos || target > cursor.buf.len() {
            break;
        }
        cursor.pos = target;
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stream_yields_empty_table() {
        let mut block = vec![0u8; 8];
        block[1] = 0x50;
        let table = parse_parameters(&block).unwrap();
        assert!(!table.has_group("INFO"));
    }

    #[test]
    fn rejects_bad_magic() {
        let block = vec![0u8; 8];
        assert!(parse_parameters(&block).is_err());
    }
}
