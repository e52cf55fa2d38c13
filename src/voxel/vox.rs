//! MagicaVoxel `.vox` reading and writing
//!
//! Only the subset the asset server produces is understood: a `MAIN` chunk
//! holding `SIZE`, `XYZI` and an optional `RGBA` palette. Unknown chunks
//! (`PACK`, scene graph nodes, materials) are skipped. When a file holds
//! several models only the first one is read.
//!
//! Chunk files may also arrive LZ4 compressed (size-prepended, as written by
//! [`compress`]); [`read_payload`] handles both.

use crate::core::error::Error;
use crate::core::types::Result;

/// File magic
pub const VOX_MAGIC: &[u8; 4] = b"VOX ";

/// Version written by [`encode`]
pub const VOX_VERSION: u32 = 150;

/// Entries in an `RGBA` palette chunk
pub const PALETTE_LEN: usize = 256;

/// Largest model extent on any axis; `XYZI` coordinates are single bytes
pub const MAX_MODEL_SIZE: u32 = 256;

const ASSET: &str = "vox chunk";

/// A single voxel in file (Z-up) coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoxVoxel {
    pub x: u8,
    pub y: u8,
    pub z: u8,
    /// Palette index, 1..=255
    pub color_index: u8,
}

/// One decoded model
#[derive(Clone, Debug, PartialEq)]
pub struct VoxModel {
    /// Extent in file coordinates (x, y, z with z up)
    pub size: [u32; 3],
    pub voxels: Vec<VoxVoxel>,
    /// `palette[i]` is the RGBA colour of color index `i + 1`
    pub palette: Option<Vec<[u8; 4]>>,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, context: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::decode(
                ASSET,
                format!("truncated {context}: need {n} bytes, have {}", self.remaining()),
            ));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self, context: &str) -> Result<u32> {
        let bytes = self.take(4, context)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn id(&mut self) -> Result<[u8; 4]> {
        let bytes = self.take(4, "chunk id")?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// Parse an uncompressed `.vox` file
pub fn parse(data: &[u8]) -> Result<VoxModel> {
    let mut reader = Reader::new(data);

    if reader.take(4, "header")? != VOX_MAGIC {
        return Err(Error::decode(ASSET, "missing VOX magic"));
    }
    let _version = reader.u32("version")?;

    if &reader.id()? != b"MAIN" {
        return Err(Error::decode(ASSET, "first chunk is not MAIN"));
    }
    let main_content = reader.u32("MAIN content size")? as usize;
    let main_children = reader.u32("MAIN children size")? as usize;
    reader.take(main_content, "MAIN content")?;
    let mut children = Reader::new(reader.take(main_children, "MAIN children")?);

    let mut size: Option<[u32; 3]> = None;
    let mut voxels: Option<Vec<VoxVoxel>> = None;
    let mut palette = None;

    while children.remaining() > 0 {
        let id = children.id()?;
        let content_len = children.u32("chunk content size")? as usize;
        let nested_len = children.u32("chunk children size")? as usize;
        let mut content = Reader::new(children.take(content_len, "chunk content")?);
        children.take(nested_len, "chunk children")?;

        match &id {
            b"SIZE" if size.is_none() => {
                let dims = [
                    content.u32("SIZE x")?,
                    content.u32("SIZE y")?,
                    content.u32("SIZE z")?,
                ];
                if dims.iter().any(|&d| d == 0 || d > MAX_MODEL_SIZE) {
                    return Err(Error::decode(
                        ASSET,
                        format!(
                            "model size {}x{}x{} outside 1..={MAX_MODEL_SIZE}",
                            dims[0], dims[1], dims[2]
                        ),
                    ));
                }
                size = Some(dims);
            }
            b"XYZI" if voxels.is_none() => {
                let [sx, sy, sz] = size
                    .ok_or_else(|| Error::decode(ASSET, "XYZI before SIZE"))?;
                let count = content.u32("XYZI count")? as usize;
                let len = count
                    .checked_mul(4)
                    .ok_or_else(|| Error::decode(ASSET, "XYZI count overflows"))?;
                let raw = content.take(len, "XYZI voxels")?;
                let mut parsed = Vec::with_capacity(count);
                for v in raw.chunks_exact(4) {
                    let voxel = VoxVoxel {
                        x: v[0],
                        y: v[1],
                        z: v[2],
                        color_index: v[3],
                    };
                    if u32::from(voxel.x) >= sx || u32::from(voxel.y) >= sy || u32::from(voxel.z) >= sz {
                        return Err(Error::decode(
                            ASSET,
                            format!(
                                "voxel ({}, {}, {}) outside model size {}x{}x{}",
                                voxel.x, voxel.y, voxel.z, sx, sy, sz
                            ),
                        ));
                    }
                    parsed.push(voxel);
                }
                voxels = Some(parsed);
            }
            b"RGBA" if palette.is_none() => {
                let raw = content.take(PALETTE_LEN * 4, "RGBA palette")?;
                palette = Some(
                    raw.chunks_exact(4)
                        .map(|c| [c[0], c[1], c[2], c[3]])
                        .collect(),
                );
            }
            other => {
                log::trace!("skipping vox chunk {:?}", String::from_utf8_lossy(other));
            }
        }
    }

    let size = size.ok_or_else(|| Error::decode(ASSET, "missing SIZE chunk"))?;
    let voxels = voxels.ok_or_else(|| Error::decode(ASSET, "missing XYZI chunk"))?;

    Ok(VoxModel { size, voxels, palette })
}

/// Parse a chunk payload that is either raw `.vox` or LZ4 compressed `.vox`
pub fn read_payload(data: &[u8]) -> Result<VoxModel> {
    if data.starts_with(VOX_MAGIC) {
        return parse(data);
    }
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::decode(ASSET, format!("LZ4 decompression failed: {e}")))?;
    parse(&decompressed)
}

fn write_chunk(out: &mut Vec<u8>, id: &[u8; 4], content: &[u8], children: &[u8]) {
    out.extend_from_slice(id);
    out.extend_from_slice(&(content.len() as u32).to_le_bytes());
    out.extend_from_slice(&(children.len() as u32).to_le_bytes());
    out.extend_from_slice(content);
    out.extend_from_slice(children);
}

/// Serialize a model to `.vox` bytes
pub fn encode(model: &VoxModel) -> Vec<u8> {
    let mut children = Vec::new();

    let mut size = Vec::with_capacity(12);
    for axis in model.size {
        size.extend_from_slice(&axis.to_le_bytes());
    }
    write_chunk(&mut children, b"SIZE", &size, &[]);

    let mut xyzi = Vec::with_capacity(4 + model.voxels.len() * 4);
    xyzi.extend_from_slice(&(model.voxels.len() as u32).to_le_bytes());
    for v in &model.voxels {
        xyzi.extend_from_slice(&[v.x, v.y, v.z, v.color_index]);
    }
    write_chunk(&mut children, b"XYZI", &xyzi, &[]);

    if let Some(palette) = &model.palette {
        let mut rgba = Vec::with_capacity(PALETTE_LEN * 4);
        for i in 0..PALETTE_LEN {
            rgba.extend_from_slice(&palette.get(i).copied().unwrap_or([0, 0, 0, 0]));
        }
        write_chunk(&mut children, b"RGBA", &rgba, &[]);
    }

    let mut out = Vec::with_capacity(20 + children.len());
    out.extend_from_slice(VOX_MAGIC);
    out.extend_from_slice(&VOX_VERSION.to_le_bytes());
    write_chunk(&mut out, b"MAIN", &[], &children);
    out
}

/// Encode and LZ4 compress a model
pub fn compress(model: &VoxModel) -> Vec<u8> {
    lz4_flex::compress_prepend_size(&encode(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_model() -> VoxModel {
        VoxModel {
            size: [4, 4, 2],
            voxels: vec![
                VoxVoxel { x: 0, y: 0, z: 0, color_index: 1 },
                VoxVoxel { x: 3, y: 2, z: 1, color_index: 7 },
            ],
            palette: None,
        }
    }

    #[test]
    fn test_parse_encoded_model() {
        let model = small_model();
        let parsed = parse(&encode(&model)).expect("parse failed");
        assert_eq!(parsed, model);
    }

    #[test]
    fn test_palette_is_read() {
        let mut model = small_model();
        let mut palette = vec![[0u8, 0, 0, 255]; PALETTE_LEN];
        palette[6] = [200, 10, 10, 255];
        model.palette = Some(palette);

        let parsed = parse(&encode(&model)).unwrap();
        let palette = parsed.palette.expect("palette missing");
        assert_eq!(palette.len(), PALETTE_LEN);
        assert_eq!(palette[6], [200, 10, 10, 255]);
    }

    #[test]
    fn test_compressed_payload() {
        let model = small_model();
        let compressed = compress(&model);
        assert!(!compressed.starts_with(VOX_MAGIC));
        assert_eq!(read_payload(&compressed).unwrap(), model);
        assert_eq!(read_payload(&encode(&model)).unwrap(), model);
    }

    #[test]
    fn test_unknown_chunks_are_skipped() {
        let model = small_model();
        let bytes = encode(&model);

        // Splice a PACK chunk in front of SIZE inside MAIN's children
        let mut pack = Vec::new();
        write_chunk(&mut pack, b"PACK", &1u32.to_le_bytes(), &[]);
        let children_start = 8 + 12;
        let mut children = pack;
        children.extend_from_slice(&bytes[children_start..]);

        let mut spliced = Vec::new();
        spliced.extend_from_slice(VOX_MAGIC);
        spliced.extend_from_slice(&VOX_VERSION.to_le_bytes());
        write_chunk(&mut spliced, b"MAIN", &[], &children);

        assert_eq!(parse(&spliced).unwrap(), model);
    }

    #[test]
    fn test_bad_magic() {
        let err = parse(b"NOPE\x96\0\0\0").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = encode(&small_model());
        let err = parse(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_voxel_outside_size() {
        let mut model = small_model();
        model.voxels.push(VoxVoxel { x: 4, y: 0, z: 0, color_index: 1 });
        let err = parse(&encode(&model)).unwrap_err();
        assert!(err.to_string().contains("outside model size"));
    }

    #[test]
    fn test_xyzi_before_size() {
        let mut children = Vec::new();
        write_chunk(&mut children, b"XYZI", &0u32.to_le_bytes(), &[]);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(VOX_MAGIC);
        bytes.extend_from_slice(&VOX_VERSION.to_le_bytes());
        write_chunk(&mut bytes, b"MAIN", &[], &children);

        let err = parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("XYZI before SIZE"));
    }

    #[test]
    fn test_oversized_size_rejected() {
        for size in [[4096, 4096, 4096], [257, 1, 1], [1, 1, MAX_MODEL_SIZE + 1]] {
            let model = VoxModel { size, voxels: vec![], palette: None };
            let err = parse(&encode(&model)).unwrap_err();
            assert!(matches!(err, Error::Decode { .. }), "{size:?} accepted");
        }

        let largest = VoxModel { size: [MAX_MODEL_SIZE; 3], voxels: vec![], palette: None };
        assert_eq!(parse(&encode(&largest)).unwrap(), largest);
    }

    #[test]
    fn test_zero_size_rejected() {
        let model = VoxModel { size: [4, 0, 2], voxels: vec![], palette: None };
        let err = parse(&encode(&model)).unwrap_err();
        assert!(err.to_string().contains("outside 1..=256"));
    }

    #[test]
    fn test_garbage_is_not_lz4() {
        let err = read_payload(&[1, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("LZ4"));
    }
}
