//! FLAC metadata block parsing and re-serialization.
//!
//! A FLAC file is the `fLaC` signature, a chain of metadata blocks, then
//! audio frames to end of file. Each block is a 4-byte header (1 bit
//! last-block flag, 7 bits type, 24-bit big-endian payload length) followed
//! by its payload.
//!
//! This module works on bytes only and never touches the filesystem. A file
//! is parsed into an immutable list of block descriptors referencing the
//! original buffer; a separate serializer produces a freshly allocated
//! output with a rebuilt comment (and optionally picture) block. The audio
//! frame region is copied verbatim and never inspected.

use super::TagError;

/// Container signature
pub const FLAC_MAGIC: &[u8; 4] = b"fLaC";

/// Stream descriptor block; must be first and is preserved byte-for-byte.
pub const BLOCK_STREAMINFO: u8 = 0;
pub const BLOCK_PADDING: u8 = 1;
pub const BLOCK_VORBIS_COMMENT: u8 = 4;
pub const BLOCK_PICTURE: u8 = 6;

/// Block type 127 is forbidden by the format
const BLOCK_TYPE_INVALID: u8 = 127;

/// Largest payload a 24-bit length can describe
const MAX_BLOCK_LEN: usize = 0xFF_FFFF;

/// Picture type code for "front cover"
const PICTURE_TYPE_FRONT_COVER: u32 = 3;

/// One parsed metadata block: type, last-flag, and where its payload sits
/// in the original buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub block_type: u8,
    pub is_last: bool,
    /// Payload start offset in the source buffer
    pub offset: usize,
    /// Payload length in bytes
    pub length: usize,
}

/// A parsed FLAC file: block descriptors plus the start of the opaque
/// audio-frame region. Borrows the source buffer; nothing is copied until
/// serialization.
#[derive(Debug)]
pub struct ParsedContainer<'a> {
    bytes: &'a [u8],
    pub blocks: Vec<BlockDescriptor>,
    /// First byte of the audio frames
    pub audio_offset: usize,
}

impl<'a> ParsedContainer<'a> {
    /// Payload bytes of one block.
    pub fn payload(&self, block: &BlockDescriptor) -> &'a [u8] {
        &self.bytes[block.offset..block.offset + block.length]
    }

    /// The opaque audio-frame region (everything after the last block).
    pub fn audio_frames(&self) -> &'a [u8] {
        &self.bytes[self.audio_offset..]
    }

    /// The stream descriptor's payload.
    pub fn stream_descriptor(&self) -> &'a [u8] {
        // parse() guarantees the first block exists and is STREAMINFO
        self.payload(&self.blocks[0])
    }
}

/// Parse the signature and metadata block chain. Fails without touching
/// anything if the signature is absent or the chain is malformed.
pub fn parse(bytes: &[u8]) -> Result<ParsedContainer<'_>, TagError> {
    if bytes.len() < FLAC_MAGIC.len() || &bytes[..FLAC_MAGIC.len()] != FLAC_MAGIC {
        return Err(TagError::NotFlac);
    }

    let mut cursor = FLAC_MAGIC.len();
    let mut blocks = Vec::new();

    loop {
        let header = bytes
            .get(cursor..cursor + 4)
            .ok_or_else(|| TagError::Malformed("block header past end of file".to_string()))?;

        let is_last = header[0] & 0x80 != 0;
        let block_type = header[0] & 0x7F;
        if block_type == BLOCK_TYPE_INVALID {
            return Err(TagError::Malformed("forbidden block type 127".to_string()));
        }

        let length = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
        let offset = cursor + 4;
        if offset + length > bytes.len() {
            return Err(TagError::Malformed("block payload past end of file".to_string()));
        }

        blocks.push(BlockDescriptor {
            block_type,
            is_last,
            offset,
            length,
        });
        cursor = offset + length;

        if is_last {
            break;
        }
    }

    if blocks[0].block_type != BLOCK_STREAMINFO {
        return Err(TagError::Malformed(
            "first metadata block is not the stream descriptor".to_string(),
        ));
    }

    Ok(ParsedContainer {
        bytes,
        blocks,
        audio_offset: cursor,
    })
}

/// Build a vorbis comment payload: vendor string, then ordered KEY=VALUE
/// fields. All integers little-endian per the vorbis spec.
pub fn build_vorbis_comment(vendor: &str, fields: &[(String, String)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    out.extend_from_slice(vendor.as_bytes());
    out.extend_from_slice(&(fields.len() as u32).to_le_bytes());
    for (key, value) in fields {
        let entry = format!("{key}={value}");
        out.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        out.extend_from_slice(entry.as_bytes());
    }
    out
}

/// Build a picture block payload declaring a front cover. Width, height,
/// color depth and palette size are left zero (unknown); players read the
/// image itself for those. All integers big-endian per the FLAC spec.
pub fn build_picture(mime_type: &str, image: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&PICTURE_TYPE_FRONT_COVER.to_be_bytes());
    out.extend_from_slice(&(mime_type.len() as u32).to_be_bytes());
    out.extend_from_slice(mime_type.as_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // empty description
    out.extend_from_slice(&0u32.to_be_bytes()); // width
    out.extend_from_slice(&0u32.to_be_bytes()); // height
    out.extend_from_slice(&0u32.to_be_bytes()); // depth
    out.extend_from_slice(&0u32.to_be_bytes()); // colors
    out.extend_from_slice(&(image.len() as u32).to_be_bytes());
    out.extend_from_slice(image);
    out
}

/// Re-serialize a parsed file with a replacement comment block and optional
/// replacement picture block. Existing comment and picture blocks are
/// dropped; every other block is copied through in order with the stream
/// descriptor first; audio frames are appended verbatim.
pub fn serialize(
    parsed: &ParsedContainer<'_>,
    comment_payload: &[u8],
    picture_payload: Option<&[u8]>,
) -> Result<Vec<u8>, TagError> {
    let retained: Vec<&BlockDescriptor> = parsed
        .blocks
        .iter()
        .filter(|b| b.block_type != BLOCK_VORBIS_COMMENT && b.block_type != BLOCK_PICTURE)
        .collect();

    let total_blocks = retained.len() + 1 + usize::from(picture_payload.is_some());
    let audio = parsed.audio_frames();

    let mut out = Vec::with_capacity(
        FLAC_MAGIC.len()
            + retained.iter().map(|b| 4 + b.length).sum::<usize>()
            + 4
            + comment_payload.len()
            + picture_payload.map_or(0, |p| 4 + p.len())
            + audio.len(),
    );
    out.extend_from_slice(FLAC_MAGIC);

    let mut written = 0usize;
    for block in &retained {
        written += 1;
        push_block(&mut out, block.block_type, written == total_blocks, parsed.payload(block))?;
    }

    written += 1;
    push_block(&mut out, BLOCK_VORBIS_COMMENT, written == total_blocks, comment_payload)?;

    if let Some(picture) = picture_payload {
        written += 1;
        push_block(&mut out, BLOCK_PICTURE, written == total_blocks, picture)?;
    }

    out.extend_from_slice(audio);
    Ok(out)
}

fn push_block(out: &mut Vec<u8>, block_type: u8, is_last: bool, payload: &[u8]) -> Result<(), TagError> {
    if payload.len() > MAX_BLOCK_LEN {
        return Err(TagError::Malformed(format!(
            "block payload of {} bytes exceeds the 24-bit length field",
            payload.len()
        )));
    }
    let length = (payload.len() as u32).to_be_bytes();
    out.push(if is_last { 0x80 | block_type } else { block_type });
    out.extend_from_slice(&length[1..]);
    out.extend_from_slice(payload);
    Ok(())
}

/// Full in-memory rewrite: parse, rebuild the comment (and picture, when
/// cover bytes are supplied), re-serialize.
pub fn rewrite(
    bytes: &[u8],
    vendor: &str,
    fields: &[(String, String)],
    cover: Option<(&str, &[u8])>,
) -> Result<Vec<u8>, TagError> {
    let parsed = parse(bytes)?;
    let comment = build_vorbis_comment(vendor, fields);
    let picture = cover.map(|(mime, image)| build_picture(mime, image));
    serialize(&parsed, &comment, picture.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a synthetic FLAC file from (type, payload) block specs plus
    /// an audio tail. The last spec gets the last-block flag.
    fn flac_bytes(blocks: &[(u8, Vec<u8>)], audio: &[u8]) -> Vec<u8> {
        let mut out = FLAC_MAGIC.to_vec();
        for (i, (block_type, payload)) in blocks.iter().enumerate() {
            let is_last = i == blocks.len() - 1;
            let length = (payload.len() as u32).to_be_bytes();
            out.push(if is_last { 0x80 | block_type } else { *block_type });
            out.extend_from_slice(&length[1..]);
            out.extend_from_slice(payload);
        }
        out.extend_from_slice(audio);
        out
    }

    fn streaminfo() -> Vec<u8> {
        // Real STREAMINFO payloads are 34 bytes; the content is opaque here
        (0u8..34).collect()
    }

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    /// Decode the comment block's payload back into (vendor, entries).
    fn decode_comment(payload: &[u8]) -> (String, Vec<String>) {
        let mut cursor = 0usize;
        let read_u32 = |buf: &[u8], at: usize| {
            u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]) as usize
        };
        let vendor_len = read_u32(payload, cursor);
        cursor += 4;
        let vendor = String::from_utf8(payload[cursor..cursor + vendor_len].to_vec()).unwrap();
        cursor += vendor_len;
        let count = read_u32(payload, cursor);
        cursor += 4;
        let mut entries = Vec::new();
        for _ in 0..count {
            let len = read_u32(payload, cursor);
            cursor += 4;
            entries.push(String::from_utf8(payload[cursor..cursor + len].to_vec()).unwrap());
            cursor += len;
        }
        (vendor, entries)
    }

    #[test]
    fn test_parse_minimal_file() {
        let audio = b"audio-frames-here";
        let bytes = flac_bytes(&[(BLOCK_STREAMINFO, streaminfo())], audio);
        let parsed = parse(&bytes).unwrap();

        assert_eq!(parsed.blocks.len(), 1);
        assert!(parsed.blocks[0].is_last);
        assert_eq!(parsed.stream_descriptor(), streaminfo().as_slice());
        assert_eq!(parsed.audio_frames(), audio);
    }

    #[test]
    fn test_parse_rejects_missing_magic() {
        assert!(matches!(parse(b"ID3\x04rest"), Err(TagError::NotFlac)));
        assert!(matches!(parse(b"fL"), Err(TagError::NotFlac)));
    }

    #[test]
    fn test_parse_rejects_truncated_chain() {
        let mut bytes = flac_bytes(&[(BLOCK_STREAMINFO, streaminfo())], b"");
        // Claim a payload longer than the file
        bytes[5] = 0xFF;
        assert!(matches!(parse(&bytes), Err(TagError::Malformed(_))));
    }

    #[test]
    fn test_parse_rejects_wrong_first_block() {
        let bytes = flac_bytes(&[(BLOCK_PADDING, vec![0; 16])], b"a");
        assert!(matches!(parse(&bytes), Err(TagError::Malformed(_))));
    }

    #[test]
    fn test_parse_rejects_forbidden_block_type() {
        let bytes = flac_bytes(
            &[(BLOCK_STREAMINFO, streaminfo()), (BLOCK_TYPE_INVALID, vec![])],
            b"a",
        );
        assert!(matches!(parse(&bytes), Err(TagError::Malformed(_))));
    }

    #[test]
    fn test_empty_rewrite_preserves_descriptor_and_audio() {
        let audio: Vec<u8> = (0..255u8).cycle().take(4096).collect();
        let bytes = flac_bytes(
            &[
                (BLOCK_STREAMINFO, streaminfo()),
                (BLOCK_VORBIS_COMMENT, build_vorbis_comment("old", &fields(&[("TITLE", "Old")]))),
            ],
            &audio,
        );

        let rewritten = rewrite(&bytes, "quaver test", &[], None).unwrap();
        let reparsed = parse(&rewritten).unwrap();

        assert_eq!(reparsed.stream_descriptor(), streaminfo().as_slice());
        assert_eq!(reparsed.audio_frames(), audio.as_slice());
        assert_eq!(reparsed.audio_frames().len(), audio.len());
    }

    #[test]
    fn test_rewrite_replaces_comment_and_drops_picture() {
        let bytes = flac_bytes(
            &[
                (BLOCK_STREAMINFO, streaminfo()),
                (BLOCK_VORBIS_COMMENT, build_vorbis_comment("old", &fields(&[("TITLE", "Old")]))),
                (BLOCK_PICTURE, build_picture("image/png", b"oldpng")),
            ],
            b"audio",
        );

        let rewritten = rewrite(
            &bytes,
            "quaver test",
            &fields(&[("TITLE", "New Title"), ("ARTIST", "New Artist")]),
            None,
        )
        .unwrap();
        let reparsed = parse(&rewritten).unwrap();

        let comments: Vec<_> = reparsed
            .blocks
            .iter()
            .filter(|b| b.block_type == BLOCK_VORBIS_COMMENT)
            .collect();
        assert_eq!(comments.len(), 1);
        assert!(!reparsed.blocks.iter().any(|b| b.block_type == BLOCK_PICTURE));

        let (vendor, entries) = decode_comment(reparsed.payload(comments[0]));
        assert_eq!(vendor, "quaver test");
        assert_eq!(entries, vec!["TITLE=New Title", "ARTIST=New Artist"]);
    }

    #[test]
    fn test_rewrite_retains_unknown_blocks_in_order() {
        let seektable = vec![0xAA; 18];
        let application = vec![0xBB; 8];
        let bytes = flac_bytes(
            &[
                (BLOCK_STREAMINFO, streaminfo()),
                (3, seektable.clone()),
                (BLOCK_VORBIS_COMMENT, build_vorbis_comment("old", &[])),
                (2, application.clone()),
                (BLOCK_PADDING, vec![0; 64]),
            ],
            b"frames",
        );

        let rewritten = rewrite(&bytes, "v", &fields(&[("TITLE", "T")]), Some(("image/jpeg", b"jpg")))
            .unwrap();
        let reparsed = parse(&rewritten).unwrap();

        let types: Vec<u8> = reparsed.blocks.iter().map(|b| b.block_type).collect();
        assert_eq!(
            types,
            vec![BLOCK_STREAMINFO, 3, 2, BLOCK_PADDING, BLOCK_VORBIS_COMMENT, BLOCK_PICTURE]
        );
        assert_eq!(reparsed.payload(&reparsed.blocks[1]), seektable.as_slice());
        assert_eq!(reparsed.payload(&reparsed.blocks[2]), application.as_slice());
        assert_eq!(reparsed.audio_frames(), b"frames");
    }

    #[test]
    fn test_last_flag_sits_on_final_block_only() {
        let bytes = flac_bytes(&[(BLOCK_STREAMINFO, streaminfo())], b"x");

        let with_picture = rewrite(&bytes, "v", &[], Some(("image/jpeg", b"img"))).unwrap();
        let reparsed = parse(&with_picture).unwrap();
        let last_flags: Vec<bool> = reparsed.blocks.iter().map(|b| b.is_last).collect();
        assert_eq!(last_flags, vec![false, false, true]);

        let without_picture = rewrite(&bytes, "v", &[], None).unwrap();
        let reparsed = parse(&without_picture).unwrap();
        let last_flags: Vec<bool> = reparsed.blocks.iter().map(|b| b.is_last).collect();
        assert_eq!(last_flags, vec![false, true]);
    }

    #[test]
    fn test_picture_block_layout() {
        let payload = build_picture("image/jpeg", b"imagebytes");
        // picture type 3 (front cover)
        assert_eq!(&payload[0..4], &3u32.to_be_bytes());
        // mime length + mime
        assert_eq!(&payload[4..8], &10u32.to_be_bytes());
        assert_eq!(&payload[8..18], b"image/jpeg");
        // empty description, then four zeroed dimension fields
        assert_eq!(&payload[18..22], &0u32.to_be_bytes());
        for field in 0..4 {
            let at = 22 + field * 4;
            assert_eq!(&payload[at..at + 4], &0u32.to_be_bytes());
        }
        // data length + data
        assert_eq!(&payload[38..42], &10u32.to_be_bytes());
        assert_eq!(&payload[42..], b"imagebytes");
    }

    #[test]
    fn test_vorbis_comment_layout_is_little_endian() {
        let payload = build_vorbis_comment("v1", &fields(&[("A", "b")]));
        assert_eq!(&payload[0..4], &2u32.to_le_bytes());
        assert_eq!(&payload[4..6], b"v1");
        assert_eq!(&payload[6..10], &1u32.to_le_bytes());
        assert_eq!(&payload[10..14], &3u32.to_le_bytes());
        assert_eq!(&payload[14..17], b"A=b");
    }

    #[test]
    fn test_oversize_picture_rejected() {
        let bytes = flac_bytes(&[(BLOCK_STREAMINFO, streaminfo())], b"x");
        let huge = vec![0u8; MAX_BLOCK_LEN + 1];
        let result = rewrite(&bytes, "v", &[], Some(("image/jpeg", &huge)));
        assert!(matches!(result, Err(TagError::Malformed(_))));
    }
}
