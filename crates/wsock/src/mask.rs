//! Payload masking (RFC 6455 section 5.3).
//!
//! The operation is an involution: applying the same key twice restores the
//! input, which is what lets the send path mask into its output buffer and
//! the decoder unmask in place.

/// XORs the 4-byte `key` over `buf`, `buf[i] ^= key[i % 4]`.
///
/// The body of the span is processed in machine words with the key replicated
/// to word width; the unaligned head and the tail are handled byte-wise.
#[inline]
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    if buf.len() < size_of::<usize>() {
        return apply_mask_bytewise(buf, key);
    }

    let (head, words, tail) = unsafe { buf.align_to_mut::<usize>() };
    apply_mask_bytewise(head, key);

    let mut wide = replicate(key);
    // Keep the word key in phase with the bytes already consumed by the head.
    let phase = head.len() & 3;
    if phase > 0 {
        wide = if cfg!(target_endian = "big") {
            wide.rotate_left(8 * phase as u32)
        } else {
            wide.rotate_right(8 * phase as u32)
        };
    }

    for word in words.iter_mut() {
        *word ^= wide;
    }

    // The word block is a multiple of 4 bytes, so the tail starts at the same
    // phase as the rotated key.
    let shifted = wide.to_ne_bytes()[..4].try_into().unwrap();
    apply_mask_bytewise(tail, shifted);
}

#[inline(always)]
fn apply_mask_bytewise(buf: &mut [u8], key: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

#[inline(always)]
fn replicate(key: [u8; 4]) -> usize {
    let word = u32::from_ne_bytes(key) as u64;
    (word << 32 | word) as usize
}
