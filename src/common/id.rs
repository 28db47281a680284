//! Kademlia node Id or a lookup target
use rand::Rng;
use sha1_smol::Sha1;
use std::{
    cmp::Ordering,
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use crate::{Error, Result};

/// The size of node IDs in bytes.
pub const ID_SIZE: usize = 20;
/// The size of node IDs in bits.
pub const ID_BITS: usize = ID_SIZE * 8;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
/// Kademlia node Id or a lookup target.
///
/// Ids are interpreted as little-endian unsigned integers: the byte at the
/// highest index is the most significant one, so is the first bit of any prefix.
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    /// The smallest possible Id (all zeros).
    pub const MIN: Id = Id([0; ID_SIZE]);
    /// The largest possible Id (all ones).
    pub const MAX: Id = Id([u8::MAX; ID_SIZE]);

    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes)
    }

    /// Map an arbitrary string key into the Id space by hashing it with SHA-1.
    pub fn from_key(key: &str) -> Id {
        let mut hasher = Sha1::new();
        hasher.update(key.as_bytes());

        Id(hasher.digest().bytes())
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp.copy_from_slice(bytes);

        Ok(Id(tmp))
    }

    /// XOR distance between this Id and a target Id.
    ///
    /// Distance to self is [Id::MIN].
    pub fn distance(&self, other: &Id) -> Id {
        let mut distance = [0; ID_SIZE];

        for (i, byte) in distance.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        Id(distance)
    }

    /// Compare two Ids as little-endian unsigned integers.
    pub fn compare(a: &Id, b: &Id) -> Ordering {
        a.0.iter().rev().cmp(b.0.iter().rev())
    }

    /// Returns a comparator ordering Ids by their XOR distance to `basis`,
    /// closest first.
    pub fn closeness(basis: Id) -> impl Fn(&Id, &Id) -> Ordering {
        move |a, b| Id::compare(&basis.distance(a), &basis.distance(b))
    }

    /// Returns the bit at position `n`, counting from the most significant bit.
    pub fn bit(&self, n: usize) -> u8 {
        let byte = self.0[ID_SIZE - 1 - n / 8];

        (byte >> (7 - n % 8)) & 1
    }

    /// Iterate over the bits of this Id, most significant first.
    pub fn bits(&self) -> impl Iterator<Item = u8> {
        let id = *self;

        (0..ID_BITS).map(move |n| id.bit(n))
    }

    /// Returns `true` if the `bit_length` most significant bits of this Id
    /// equal those of `prefix`.
    pub fn has_prefix(&self, prefix: &Id, bit_length: usize) -> bool {
        debug_assert!(
            bit_length <= ID_BITS,
            "Expected a prefix of <= {ID_BITS} bits. Got: {bit_length}"
        );

        (0..bit_length.min(ID_BITS)).all(|n| self.bit(n) == prefix.bit(n))
    }

    /// Returns a copy of this Id with the bit at position `n`
    /// (from the most significant bit) set to `value`.
    pub(crate) fn with_bit(&self, n: usize, value: u8) -> Id {
        let mut bytes = self.0;
        let index = ID_SIZE - 1 - n / 8;
        let mask = 1 << (7 - n % 8);

        if value == 1 {
            bytes[index] |= mask;
        } else {
            bytes[index] &= !mask;
        }

        Id(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> Ordering {
        Id::compare(self, other)
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<[u8; ID_SIZE]> for Id {
    fn from(bytes: [u8; ID_SIZE]) -> Id {
        Id(bytes)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }

        Ok(())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Id> {
        if s.len() != ID_SIZE * 2 || !s.is_ascii() {
            return Err(Error::InvalidIdEncoding(s.to_string()));
        }

        let mut bytes = [0; ID_SIZE];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::InvalidIdEncoding(s.to_string()))?;
        }

        Ok(Id(bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn id(bytes: [u8; ID_SIZE]) -> Id {
        Id(bytes)
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(Id::random(), Id::random());
    }

    #[test]
    fn from_bytes_rejects_wrong_size() {
        assert!(matches!(
            Id::from_bytes([1, 2, 3]),
            Err(Error::InvalidIdSize(3))
        ));
        assert_eq!(Id::from_bytes([0; ID_SIZE]).unwrap(), Id::MIN);
    }

    #[test]
    fn min_and_max() {
        assert_eq!(Id::compare(&Id::MIN, &Id::MIN), Ordering::Equal);
        assert_eq!(Id::compare(&Id::MIN, &Id::MAX), Ordering::Less);
        assert_eq!(Id::compare(&Id::MAX, &Id::MIN), Ordering::Greater);
    }

    #[test]
    fn little_endian_ordering() {
        let mut low = [0; ID_SIZE];
        low[0] = 255;
        let mut high = [0; ID_SIZE];
        high[1] = 255;

        assert_eq!(Id::compare(&id(low), &id(high)), Ordering::Less);
        assert!(id(low) < id(high));
    }

    #[test]
    fn xor_distance() {
        let a = id([
            255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 0, 0, 0, 0,
            0,
        ]);
        let b = id([
            0, 0, 0, 0, 0, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
            255,
        ]);
        let expected = id([
            255, 255, 255, 255, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 255, 255, 255, 255, 255,
        ]);

        assert_eq!(a.distance(&b), expected);
    }

    #[test]
    fn distance_is_symmetric_and_zero_to_self() {
        for _ in 0..32 {
            let a = Id::random();
            let b = Id::random();

            assert_eq!(a.distance(&b), b.distance(&a));
            assert_eq!(a.distance(&a), Id::MIN);
        }
    }

    #[test]
    fn closeness_comparator() {
        let mut basis = [0; ID_SIZE];
        basis[0] = 255;
        basis[1] = 255;
        let basis = id(basis);

        // Distance is FF 00 00 ...
        let mut near = [0; ID_SIZE];
        near[1] = 255;
        let near = id(near);

        // Distance is 00 FF 00 ...
        let mut far = [0; ID_SIZE];
        far[0] = 255;
        let far = id(far);

        let closeness = Id::closeness(basis);

        assert_eq!(closeness(&near, &far), Ordering::Less);
        assert_eq!(closeness(&far, &near), Ordering::Greater);
        assert_eq!(closeness(&near, &near), Ordering::Equal);
    }

    #[test]
    fn closeness_is_a_strict_weak_ordering() {
        let basis = Id::random();
        let closeness = Id::closeness(basis);
        let ids: Vec<Id> = (0..24).map(|_| Id::random()).collect();

        for a in &ids {
            assert_eq!(closeness(a, a), Ordering::Equal);

            for b in &ids {
                assert_eq!(closeness(a, b), closeness(b, a).reverse());

                for c in &ids {
                    if closeness(a, b) == Ordering::Less && closeness(b, c) == Ordering::Less {
                        assert_eq!(closeness(a, c), Ordering::Less);
                    }
                }
            }
        }
    }

    #[test]
    fn has_prefix() {
        // Most significant byte is the last one: 1011_0000
        let mut bytes = [0; ID_SIZE];
        bytes[ID_SIZE - 1] = 0b1011_0000;
        let subject = id(bytes);

        // Prefix 1010_0000 agrees on the first three bits only.
        let mut prefix = [0; ID_SIZE];
        prefix[ID_SIZE - 1] = 0b1010_0000;
        let prefix = id(prefix);

        assert!(subject.has_prefix(&prefix, 0));
        assert!(subject.has_prefix(&prefix, 1));
        assert!(subject.has_prefix(&prefix, 3));
        assert!(!subject.has_prefix(&prefix, 4));
        assert!(!subject.has_prefix(&prefix, ID_BITS));
        assert!(subject.has_prefix(&subject, ID_BITS));
    }

    #[test]
    fn zero_length_prefix_matches_anything() {
        assert!(Id::random().has_prefix(&Id::MAX, 0));
        assert!(Id::MIN.has_prefix(&Id::MAX, 0));
    }

    #[test]
    fn bits_are_most_significant_first() {
        let mut bytes = [0; ID_SIZE];
        bytes[ID_SIZE - 1] = 0b1000_0001;
        bytes[0] = 0b0000_0001;
        let subject = id(bytes);

        let bits: Vec<u8> = subject.bits().collect();

        assert_eq!(bits.len(), ID_BITS);
        assert_eq!(&bits[..8], &[1, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(bits[ID_BITS - 1], 1);
        assert_eq!(bits.iter().filter(|b| **b == 1).count(), 3);

        // Restartable
        assert_eq!(subject.bits().collect::<Vec<_>>(), bits);
    }

    #[test]
    fn with_bit() {
        let id = Id::MIN.with_bit(0, 1).with_bit(9, 1);

        assert_eq!(id.0[ID_SIZE - 1], 0b1000_0000);
        assert_eq!(id.0[ID_SIZE - 2], 0b0100_0000);
        assert_eq!(id.with_bit(0, 0).0[ID_SIZE - 1], 0);
    }

    #[test]
    fn from_key_is_sha1() {
        let id = Id::from_key("1:name");

        assert_eq!(id, Id::from_key("1:name"));
        assert_ne!(id, Id::from_key("2:name"));
        // sha1("") = da39a3ee5e6b4b0d3255bfef95601890afd80709
        assert_eq!(
            Id::from_key(""),
            Id::from_str("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap()
        );
    }

    #[test]
    fn hex_round_trip() {
        let id = Id::random();

        assert_eq!(Id::from_str(&id.to_string()).unwrap(), id);
        assert!(Id::from_str("zz").is_err());
    }
}
