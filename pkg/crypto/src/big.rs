use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};

/// A set of operations which all result in a 'mod n' result.
pub struct Modulo<'a> {
    pub n: &'a BigUint,
}

impl<'a> Modulo<'a> {
    pub fn new(n: &'a BigUint) -> Self {
        Modulo { n }
    }

    pub fn rem(&self, a: &BigUint) -> BigUint {
        a % self.n
    }

    pub fn add(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a + b) % self.n
    }

    pub fn sub(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (((a % self.n) + self.n) - (b % self.n)) % self.n
    }

    pub fn mul(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a * b) % self.n
    }

    /// Computes a^b mod n
    pub fn pow(&self, a: &BigUint, b: &BigUint) -> BigUint {
        a.modpow(b, self.n)
    }

    /// Computes the modular inverse 'a^-1' such that 'a*(a^-1) = 1 mod n'.
    ///
    /// Returns None if no inverse exists (gcd(a, n) != 1).
    ///
    /// Algorithm is equivalent to the following (but using modular arithmetic
    /// instead of signed arithmetic): https://en.wikipedia.org/wiki/Extended_Euclidean_algorithm#Modular_integers
    pub fn inv(&self, a: &BigUint) -> Option<BigUint> {
        let mut t = BigUint::zero();
        let mut new_t = BigUint::one();
        let mut r = self.n.clone();
        let mut new_r = a % self.n;

        while !new_r.is_zero() {
            let (q, rem) = r.div_rem(&new_r);
            let next_t = self.sub(&t, &(&q * &new_t));
            t = core::mem::replace(&mut new_t, next_t);
            r = core::mem::replace(&mut new_r, rem);
        }

        if r > BigUint::one() {
            return None;
        }

        Some(t)
    }

    /// Computes '-1*a mod n'
    pub fn negate(&self, a: &BigUint) -> BigUint {
        self.sub(self.n, a)
    }
}

/// Big-endian encoding of 'x' left padded with zeros to exactly 'len' bytes.
///
/// The value must fit in 'len' bytes.
pub fn to_be_bytes_padded(x: &BigUint, len: usize) -> Vec<u8> {
    if x.is_zero() {
        return vec![0u8; len];
    }

    let raw = x.to_bytes_be();
    assert!(raw.len() <= len);

    let mut out = vec![0u8; len];
    out[(len - raw.len())..].copy_from_slice(&raw);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulo_test() {
        let p = BigUint::from(7u32);
        let m = Modulo::new(&p);
        let x = m.inv(&2u32.into()).unwrap();
        assert_eq!(x, BigUint::from(4u32));

        assert_eq!(m.sub(&2u32.into(), &5u32.into()), BigUint::from(4u32));
        assert_eq!(m.negate(&3u32.into()), BigUint::from(4u32));
        assert_eq!(
            m.pow(&3u32.into(), &6u32.into()),
            BigUint::from(1u32) // Fermat
        );
    }

    #[test]
    fn no_inverse_test() {
        let n = BigUint::from(12u32);
        let m = Modulo::new(&n);
        assert!(m.inv(&8u32.into()).is_none());
        assert!(m.inv(&BigUint::zero()).is_none());
        assert_eq!(m.inv(&5u32.into()), Some(BigUint::from(5u32)));
    }

    #[test]
    fn inv_large_test() {
        // Inverse of q = 2^127 - 1 modulo p = 2^521 - 1, checked by
        // multiplying back out.
        let p = (BigUint::one() << 521u32) - 1u32;
        let q = (BigUint::one() << 127u32) - 1u32;
        let m = Modulo::new(&p);
        let qinv = m.inv(&q).unwrap();
        assert_eq!(m.mul(&q, &qinv), BigUint::one());
    }

    #[test]
    fn to_be_bytes_padded_test() {
        let x = BigUint::from(0x0102u32);
        assert_eq!(to_be_bytes_padded(&x, 4), vec![0, 0, 1, 2]);
        assert_eq!(to_be_bytes_padded(&x, 2), vec![1, 2]);
        assert_eq!(to_be_bytes_padded(&BigUint::zero(), 3), vec![0, 0, 0]);
    }
}
