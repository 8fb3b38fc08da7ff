pub const SIGMA: usize = 6; // {0:$, 1:A, 2:C, 3:G, 4:T, 5:N}

#[inline]
pub fn to_alphabet(b: u8) -> u8 {
    if b == 0 { return 0; }
    match b.to_ascii_uppercase() {
        b'A' => 1,
        b'C' => 2,
        b'G' => 3,
        b'T' | b'U' => 4,
        _ => 5, // map others to N
    }
}

/// 严格编码：只接受 ACGTN（大小写均可），其余符号返回 None。
#[inline]
pub fn to_alphabet_strict(b: u8) -> Option<u8> {
    match b.to_ascii_uppercase() {
        b'A' => Some(1),
        b'C' => Some(2),
        b'G' => Some(3),
        b'T' => Some(4),
        b'N' => Some(5),
        _ => None,
    }
}

/// 2-bit 编码，非 ACGT 返回 None。
#[inline]
pub fn to_2bit(b: u8) -> Option<u64> {
    match b {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

pub fn normalize_seq(seq: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(seq.len());
    for &b in seq {
        let up = b.to_ascii_uppercase();
        let nb = match up {
            b'A' | b'C' | b'G' | b'T' | b'N' => up,
            b'U' => b'T',
            _ => b'N',
        };
        out.push(nb);
    }
    out
}

#[inline]
pub fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' | b'U' => b'A',
        b'-' => b'-',
        _ => b'N',
    }
}

pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revcomp_known_values() {
        assert_eq!(revcomp(b"AACCGG"), b"CCGGTT".to_vec());
        assert_eq!(revcomp(b"AACCGGTT"), b"AACCGGTT".to_vec());
        assert_eq!(revcomp(b"acgN-"), b"-NCGT".to_vec());
    }

    #[test]
    fn strict_alphabet_rejects_symbols() {
        assert_eq!(to_alphabet_strict(b'g'), Some(3));
        assert_eq!(to_alphabet_strict(b'N'), Some(5));
        assert_eq!(to_alphabet_strict(b'X'), None);
        assert_eq!(to_alphabet_strict(b'-'), None);
    }

    #[test]
    fn two_bit_only_acgt() {
        assert_eq!(to_2bit(b'T'), Some(3));
        assert_eq!(to_2bit(b'N'), None);
    }
}
