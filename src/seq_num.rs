use std::fmt::{Display, Formatter};

/// A 12-bit NSP segment number. All arithmetic and ordering is modulo 4096; the raw value is
///  always kept in the range `0..4096`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct SeqNum(u16);

impl Display for SeqNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SeqNum {
    pub const MASK: u16 = 0x0fff;
    pub const ZERO: SeqNum = SeqNum(0);

    /// half the sequence space: numbers closer than this are ordered, numbers exactly this far
    ///  apart are not ordered in either direction
    const HALF_RANGE: u16 = 2048;

    /// masks away everything above the low 12 bits, so ack sub-fields with their flag bits can
    ///  be passed in directly
    pub fn from_raw(value: u16) -> SeqNum {
        SeqNum(value & Self::MASK)
    }

    pub fn to_raw(&self) -> u16 {
        self.0
    }

    /// true iff `self` is strictly ahead of `other` in the cyclic sequence space
    pub fn is_after(&self, other: SeqNum) -> bool {
        let distance = self.0.wrapping_sub(other.0) & Self::MASK;
        distance != 0 && distance < Self::HALF_RANGE
    }

    /// `self` is a receive cursor, i.e. the next expected number: NSP has no acceptance window,
    ///  so only an exact match is in sequence
    pub fn is_next(&self, candidate: SeqNum) -> bool {
        *self == candidate
    }

    pub fn next(&self) -> SeqNum {
        SeqNum(self.0.wrapping_add(1) & Self::MASK)
    }

    #[cfg(test)]
    pub fn prev(&self) -> SeqNum {
        SeqNum(self.0.wrapping_sub(1) & Self::MASK)
    }

    pub fn advance(&mut self) {
        *self = self.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::equal(5, 5, false)]
    #[case::one_ahead(6, 5, true)]
    #[case::one_behind(5, 6, false)]
    #[case::wrap_ahead(0, 4095, true)]
    #[case::wrap_behind(4095, 0, false)]
    #[case::almost_half(2047, 0, true)]
    #[case::half(2048, 0, false)]
    #[case::half_reverse(0, 2048, false)]
    #[case::beyond_half(2049, 0, false)]
    #[case::beyond_half_reverse(0, 2049, true)]
    fn test_is_after(#[case] a: u16, #[case] b: u16, #[case] expected: bool) {
        assert_eq!(SeqNum::from_raw(a).is_after(SeqNum::from_raw(b)), expected);
    }

    #[test]
    fn test_is_after_antisymmetric() {
        for a in (0..4096u16).step_by(3) {
            for b in (0..4096u16).step_by(7) {
                let distance = a.wrapping_sub(b) & SeqNum::MASK;
                if distance == 0 || distance == 2048 {
                    continue;
                }

                let a_after_b = SeqNum::from_raw(a).is_after(SeqNum::from_raw(b));
                assert_eq!(a_after_b, !SeqNum::from_raw(b).is_after(SeqNum::from_raw(a)), "{} / {}", a, b);
                assert_eq!(a_after_b, distance < 2048, "{} / {}", a, b);
            }
        }
    }

    #[rstest]
    #[case(0, 1)]
    #[case(17, 18)]
    #[case(4094, 4095)]
    #[case(4095, 0)]
    fn test_next(#[case] value: u16, #[case] expected: u16) {
        let mut seq = SeqNum::from_raw(value);
        assert_eq!(seq.next(), SeqNum::from_raw(expected));
        assert_eq!(seq.next().prev(), seq);

        seq.advance();
        assert_eq!(seq.to_raw(), expected);
    }

    #[rstest]
    #[case::exact(10, 10, true)]
    #[case::one_ahead(10, 11, false)]
    #[case::replay(10, 9, false)]
    fn test_is_next(#[case] expected: u16, #[case] candidate: u16, #[case] result: bool) {
        assert_eq!(SeqNum::from_raw(expected).is_next(SeqNum::from_raw(candidate)), result);
    }

    #[test]
    fn test_from_raw_masks_flag_bits() {
        assert_eq!(SeqNum::from_raw(0x8000 | 0x2000 | 0x0123).to_raw(), 0x0123);
    }
}
