#![forbid(unsafe_code)]
//! Field encoding helpers shared by the fixed-layout record codecs.

pub mod ne {
    //! Native-endian integer fields.
    //!
    //! Files are only ever read back on the host that wrote them, so integers are
    //! stored in host byte order with no conversion.

    /// Reads a `u32` from the first four bytes of `src`.
    #[inline]
    pub fn get_u32(src: &[u8]) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&src[..4]);
        u32::from_ne_bytes(raw)
    }

    /// Reads a `u64` from the first eight bytes of `src`.
    #[inline]
    pub fn get_u64(src: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&src[..8]);
        u64::from_ne_bytes(raw)
    }

    /// Writes `v` into the first four bytes of `dst`.
    #[inline]
    pub fn put_u32(dst: &mut [u8], v: u32) {
        dst[..4].copy_from_slice(&v.to_ne_bytes());
    }

    /// Writes `v` into the first eight bytes of `dst`.
    #[inline]
    pub fn put_u64(dst: &mut [u8], v: u64) {
        dst[..8].copy_from_slice(&v.to_ne_bytes());
    }
}

pub mod fixed {
    //! Bounded string fields.
    //!
    //! Every fixed-width text field follows one policy: input longer than
    //! `width - 1` bytes is truncated at the nearest UTF-8 boundary at or below
    //! that limit and the remainder of the field is NUL-filled. Invalid UTF-8
    //! found on disk is replaced lossily.
    //!
    //! NUL-terminated fields end at the first NUL of their input as well, so
    //! what is written is exactly what reads back. Length-delimited fields keep
    //! embedded NULs.

    /// Longest prefix of `s` that fits in `max` bytes without splitting a character.
    pub fn truncate_utf8(s: &str, max: usize) -> &str {
        if s.len() <= max {
            return s;
        }
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }

    /// The part of `s` a NUL-terminated field of `max` text bytes keeps.
    pub fn terminated(s: &str, max: usize) -> &str {
        let end = s.find('\0').unwrap_or(s.len());
        truncate_utf8(&s[..end], max)
    }

    /// Writes `s` into `dst` as a NUL-terminated field, returning the stored byte length.
    pub fn put_str(dst: &mut [u8], s: &str) -> usize {
        let max = dst.len().saturating_sub(1);
        put_bytes(dst, terminated(s, max))
    }

    /// Writes `s` into `dst` for a length-delimited read, returning the stored byte length.
    pub fn put_str_len(dst: &mut [u8], s: &str) -> usize {
        let max = dst.len().saturating_sub(1);
        put_bytes(dst, truncate_utf8(s, max))
    }

    fn put_bytes(dst: &mut [u8], stored: &str) -> usize {
        let stored = stored.as_bytes();
        dst[..stored.len()].copy_from_slice(stored);
        dst[stored.len()..].fill(0);
        stored.len()
    }

    /// Reads a NUL-terminated field.
    pub fn get_str(src: &[u8]) -> String {
        let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
        String::from_utf8_lossy(&src[..end]).into_owned()
    }

    /// Reads a length-delimited field, clamping the length to the field width.
    pub fn get_str_len(src: &[u8], len: usize) -> String {
        let end = len.min(src.len());
        String::from_utf8_lossy(&src[..end]).into_owned()
    }

    /// Whether a NUL-terminated field holds no text.
    #[inline]
    pub fn is_blank(src: &[u8]) -> bool {
        src.first().map_or(true, |&b| b == 0)
    }
}

pub mod hexdump {
    //! Offset-annotated hex dumps for the inspector.

    /// Renders `bytes` as lines of 16 bytes: offset, hex, printable ASCII.
    pub fn lines(base: u64, bytes: &[u8]) -> Vec<String> {
        bytes
            .chunks(16)
            .enumerate()
            .map(|(i, chunk)| {
                let hex = chunk
                    .iter()
                    .map(|b| hex::encode_upper([*b]))
                    .collect::<Vec<_>>()
                    .join(" ");
                let ascii: String = chunk
                    .iter()
                    .map(|&b| if (32..127).contains(&b) { b as char } else { '.' })
                    .collect();
                format!("{:08X}: {hex:<47}  {ascii}", base + (i * 16) as u64)
            })
            .collect()
    }
}
