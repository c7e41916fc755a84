use anyhow::{anyhow, Result};
use num_bigint::BigUint;
use num_traits::Zero;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::big::{to_be_bytes_padded, Modulo};
use crate::hasher::*;
use crate::utils::xor_inplace;
use crate::wire::{Reader, Writer};

/// RSASSA-PKCS1-v1_5 instantiation: the signature blob's algorithm name, the
/// hash, and the DER DigestInfo prefix placed in front of the digest
/// (including the leading zero byte which terminates the 0xFF padding).
pub struct SignatureScheme {
    pub name: &'static str,
    pub hash: fn() -> HasherFactory,
    pub digest_info: &'static [u8],
}

/// "ssh-rsa": SHA-1. SEQUENCE { SEQUENCE { OID 1.3.14.3.2.26, NULL },
/// OCTET STRING (20) }.
pub static RSA_SHA1: SignatureScheme = SignatureScheme {
    name: "ssh-rsa",
    hash: SHA1Hasher::factory,
    digest_info: &[
        0x00, 0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2B, 0x0E, 0x03, 0x02, 0x1A, 0x05, 0x00, 0x04,
        0x14,
    ],
};

pub static RSA_SHA2_256: SignatureScheme = SignatureScheme {
    name: "rsa-sha2-256",
    hash: SHA256Hasher::factory,
    digest_info: &[
        0x00, 0x30, 0x31, 0x30, 0x0D, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
        0x01, 0x05, 0x00, 0x04, 0x20,
    ],
};

pub static RSA_SHA2_512: SignatureScheme = SignatureScheme {
    name: "rsa-sha2-512",
    hash: SHA512Hasher::factory,
    digest_info: &[
        0x00, 0x30, 0x51, 0x30, 0x0D, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
        0x03, 0x05, 0x00, 0x04, 0x40,
    ],
};

/// In-memory RSA key. Public keys populate 'modulus' and 'exponent'; private
/// keys additionally carry d, p, q and iqmp.
///
/// A key assembled by a codec must pass verify() before it is used for a
/// private operation.
#[derive(Clone, Default)]
pub struct RSAKey {
    pub modulus: BigUint,
    pub exponent: BigUint,

    /// Nominal modulus size in bits as recorded in the SSH-1 length word.
    /// May exceed the real bit count of the modulus.
    pub bits: usize,

    /// Modulus length in bytes as encoded on the SSH-1 wire; sizes the
    /// SSH-1 PKCS#1 block.
    pub bytes: usize,

    pub private_exponent: Option<BigUint>,
    pub p: Option<BigUint>,
    pub q: Option<BigUint>,
    pub iqmp: Option<BigUint>,

    pub comment: Option<String>,
}

impl RSAKey {
    pub fn from_public(modulus: BigUint, exponent: BigUint) -> Self {
        let bits = modulus.bits() as usize;
        Self {
            bits,
            bytes: (bits + 7) / 8,
            modulus,
            exponent,
            ..Default::default()
        }
    }

    pub fn is_private(&self) -> bool {
        self.private_exponent.is_some()
            && self.p.is_some()
            && self.q.is_some()
            && self.iqmp.is_some()
    }

    /// Real bit count of the modulus.
    pub fn bit_count(&self) -> usize {
        self.modulus.bits() as usize
    }

    /// Modulus length in bytes, from the real bit count.
    pub fn byte_count(&self) -> usize {
        (self.bit_count() + 7) / 8
    }

    /// Consistency check for an imported private key. Returns false when any
    /// invariant fails; on success the primes are left in canonical order
    /// (p > q) with a matching iqmp.
    pub fn verify(&mut self) -> bool {
        let d = match &self.private_exponent {
            Some(v) => v,
            None => return false,
        };
        let (mut p, mut q, mut iqmp) = match (&self.p, &self.q, &self.iqmp) {
            (Some(p), Some(q), Some(iqmp)) => (p.clone(), q.clone(), iqmp.clone()),
            _ => return false,
        };

        if p.is_zero() || q.is_zero() {
            return false;
        }

        // n = p*q
        if &p * &q != self.modulus {
            return false;
        }

        // e*d must be a unit modulo p-1 and modulo q-1.
        let ed = &self.exponent * d;
        let one = BigUint::from(1u32);
        if &ed % (&p - 1u32) != one || &ed % (&q - 1u32) != one {
            return false;
        }

        // Canonical prime order, recomputing iqmp when a swap was needed.
        if p <= q {
            std::mem::swap(&mut p, &mut q);
            iqmp = match Modulo::new(&p).inv(&q) {
                Some(v) => v,
                None => return false,
            };
        }

        if Modulo::new(&p).mul(&iqmp, &q) != one {
            return false;
        }

        self.p = Some(p);
        self.q = Some(q);
        self.iqmp = Some(iqmp);
        true
    }

    /// Public operation m^e mod n. All operands are public so no timing
    /// mitigation applies.
    pub fn public_op(&self, m: &BigUint) -> BigUint {
        Modulo::new(&self.modulus).pow(m, &self.exponent)
    }

    fn private_components(&self) -> (&BigUint, &BigUint, &BigUint, &BigUint) {
        let msg = "private operation on a public-only key";
        (
            self.private_exponent.as_ref().expect(msg),
            self.p.as_ref().expect(msg),
            self.q.as_ref().expect(msg),
            self.iqmp.as_ref().expect(msg),
        )
    }

    /// Private operation x^d mod n, with CRT acceleration and message
    /// blinding so that the exponentiation's timing is independent of x.
    pub fn private_op(&self, x: &BigUint) -> BigUint {
        let (d, p, q, iqmp) = self.private_components();
        let n = &self.modulus;
        let m = Modulo::new(n);

        let mut stream = BlindingStream::new(d, x);
        let nbits = self.modulus.bits();

        // Rejection sample a blinding value invertible mod n, continuing the
        // same bit stream across rejected candidates.
        let (r, r_inv) = loop {
            let mut r = BigUint::zero();
            for i in (0..nbits).rev() {
                if stream.next_bit() == 1 {
                    r.set_bit(i, true);
                }
            }

            if r.is_zero() || &r >= n {
                continue;
            }
            if let Some(r_inv) = m.inv(&r) {
                break (r, r_inv);
            }
        };

        // Encrypting r with the public exponent yields the matching blinding
        // pair without a second private-exponent exponentiation.
        let r_enc = crt_modpow(&r, &self.exponent, n, p, q, iqmp);

        let blinded = m.mul(x, &r_enc);
        let y = crt_modpow(&blinded, d, n, p, q, iqmp);
        m.mul(&y, &r_inv)
    }

    /// RSASSA-PKCS1-v1_5 signature over 'data', emitted as the SSH-2
    /// signature blob (algorithm name string followed by an mpint).
    pub fn sign(&self, scheme: &SignatureScheme, data: &[u8]) -> Vec<u8> {
        let hash = (scheme.hash)().create().finish_with(data);

        // One byte less than the modulus length so that the encoded integer
        // stays strictly below n.
        let k = (self.bit_count() - 1) / 8;
        assert!(k >= hash.len() + scheme.digest_info.len() + 1);

        let mut em = vec![0xffu8; k];
        em[0] = 0x01;
        let info_at = k - hash.len() - scheme.digest_info.len();
        em[info_at..(info_at + scheme.digest_info.len())].copy_from_slice(scheme.digest_info);
        em[(k - hash.len())..].copy_from_slice(&hash);

        let sig = self.private_op(&BigUint::from_bytes_be(&em));

        let mut w = Writer::new();
        w.write_string(scheme.name.as_bytes());
        w.write_mpint(&sig);
        w.into_bytes()
    }

    /// Checks an SSH-2 signature blob over 'data'. Any mismatch (name,
    /// framing, padding layout or digest) yields false. The layout check
    /// runs over the whole buffer instead of returning at the first
    /// signer-controllable difference.
    pub fn verify_signature(&self, scheme: &SignatureScheme, signature: &[u8], data: &[u8]) -> bool {
        let mut r = Reader::new(signature);
        let name = match r.read_string() {
            Ok(v) => v,
            Err(_) => return false,
        };
        if name != scheme.name.as_bytes() {
            return false;
        }
        let sig = match r.read_mpint() {
            Ok(v) => v,
            Err(_) => return false,
        };

        let m = self.public_op(&sig);

        let hash = (scheme.hash)().create().finish_with(data);
        let info = scheme.digest_info;
        let bytes = self.byte_count();
        if bytes < hash.len() + info.len() + 2 {
            return false;
        }

        let em = to_be_bytes_padded(&m, bytes);

        // Top (partial) byte zero, then 0x01, then 0xFF filler down to the
        // DigestInfo prefix, then the digest itself.
        let mut ok = em[0] == 0x00;
        ok &= em[1] == 0x01;
        for i in 2..(bytes - hash.len() - info.len()) {
            ok &= em[i] == 0xff;
        }
        ok &= crate::constant_eq(
            &em[(bytes - hash.len() - info.len())..(bytes - hash.len())],
            info,
        );
        ok &= crate::constant_eq(&em[(bytes - hash.len())..], &hash);
        ok
    }

    /// SSH-1 session key encryption: PKCS#1 v1.5 type 2 padding sized by the
    /// key's SSH-1 'bytes' field, then the public operation.
    pub fn encrypt_ssh1(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() + 4 > self.bytes {
            return Err(anyhow!("Plaintext too long for the key modulus"));
        }

        let mut block = vec![0u8; self.bytes];
        block[1] = 0x02;

        let pad_end = self.bytes - data.len() - 1;
        for b in &mut block[2..pad_end] {
            // The filler must be nonzero; redraw any zero byte.
            *b = loop {
                let mut byte = [0u8; 1];
                OsRng.fill_bytes(&mut byte);
                if byte[0] != 0 {
                    break byte[0];
                }
            };
        }
        block[pad_end] = 0x00;
        block[(self.bytes - data.len())..].copy_from_slice(data);

        let c = self.public_op(&BigUint::from_bytes_be(&block));
        Ok(to_be_bytes_padded(&c, self.bytes))
    }

    /// RSAES-OAEP encryption with an empty label (RFC 8017 section 7.1), as
    /// used by the SSH-2 RSA key exchange. Produces exactly one modulus
    /// length of ciphertext.
    pub fn encrypt_oaep(&self, hash: &HasherFactory, input: &[u8]) -> Vec<u8> {
        let k = self.byte_count();
        let hlen = hash.create().output_size();

        assert!(k >= 2 * hlen + 2);
        assert!(!input.is_empty() && input.len() <= k - 2 * hlen - 2);

        let mut out = vec![0u8; k];
        OsRng.fill_bytes(&mut out[1..(1 + hlen)]);
        let label_hash = hash.create().finish();
        out[(1 + hlen)..(1 + 2 * hlen)].copy_from_slice(&label_hash);
        out[k - input.len() - 1] = 0x01;
        out[(k - input.len())..].copy_from_slice(input);

        // Mask DB with the seed, then the seed with the masked DB.
        let (seed, db) = out[1..].split_at_mut(hlen);
        mgf1_xor(hash, seed, db);
        mgf1_xor(hash, db, seed);

        let c = self.public_op(&BigUint::from_bytes_be(&out));
        to_be_bytes_padded(&c, k)
    }
}

/// x^exp mod n evaluated through the prime factors: reduce the exponent mod
/// p-1 and q-1, exponentiate against each prime, then lift the residue pair
/// back to Z_n with the cached iqmp.
fn crt_modpow(
    base: &BigUint,
    exp: &BigUint,
    n: &BigUint,
    p: &BigUint,
    q: &BigUint,
    iqmp: &BigUint,
) -> BigUint {
    let pexp = exp % (p - 1u32);
    let qexp = exp % (q - 1u32);

    let mut pres = base.modpow(&pexp, p);
    let qres = base.modpow(&qexp, q);

    // Adjust qres to match pres mod p without disturbing its residue mod q.
    // Keep the difference non-negative first.
    if pres < qres {
        pres += p;
    }
    let out = &qres + (&pres - &qres) * (iqmp * q);
    out % n
}

const BLINDING_LABEL: &[u8] = b"RSA deterministic blinding";

/// Deterministic bit source for blinding values, keyed off the private
/// exponent and the operation input so that the private op never draws from
/// a shared entropy pool. Bits come from SHA-512 over the label, a 32-bit
/// retry counter and the SSH-2 mpint of d, re-hashed with the mpint of x;
/// each digest byte is consumed least significant bit first.
struct BlindingStream {
    d_mpint: Zeroizing<Vec<u8>>,
    x_mpint: Vec<u8>,
    hashseq: u32,
    digest: Zeroizing<Vec<u8>>,
    bits_used: usize,
}

impl BlindingStream {
    fn new(d: &BigUint, x: &BigUint) -> Self {
        let mut w = Writer::new();
        w.write_mpint(d);
        let d_mpint = Zeroizing::new(w.into_bytes());

        let mut w = Writer::new();
        w.write_mpint(x);
        let x_mpint = w.into_bytes();

        let mut out = Self {
            d_mpint,
            x_mpint,
            hashseq: 0,
            digest: Zeroizing::new(vec![]),
            bits_used: 0,
        };
        out.rederive();
        out
    }

    fn rederive(&mut self) {
        let mut h = SHA512Hasher::default();
        h.update(BLINDING_LABEL);
        h.update(&self.hashseq.to_be_bytes());
        h.update(&self.d_mpint);
        let seed = Zeroizing::new(h.finish());

        let mut h = SHA512Hasher::default();
        h.update(&seed);
        h.update(&self.x_mpint);
        self.digest = Zeroizing::new(h.finish());
        self.bits_used = 0;
    }

    fn next_bit(&mut self) -> u8 {
        if self.bits_used == 8 * self.digest.len() {
            self.hashseq += 1;
            self.rederive();
        }

        let bit = (self.digest[self.bits_used / 8] >> (self.bits_used % 8)) & 1;
        self.bits_used += 1;
        bit
    }
}

/// MGF1 (RFC 8017 appendix B.2.1) in XOR form: successive h(seed || counter)
/// blocks are XORed into 'dst' until it is covered.
pub fn mgf1_xor(hash: &HasherFactory, seed: &[u8], dst: &mut [u8]) {
    // Precompute a partial hash state for the seed; every block then only
    // absorbs the counter.
    let prefix_hasher = {
        let mut h = hash.create();
        h.update(seed);
        h
    };

    let mut counter: u32 = 0;
    let mut offset = 0;
    while offset < dst.len() {
        let block = {
            let mut h = prefix_hasher.box_clone();
            h.update(&counter.to_be_bytes());
            h.finish()
        };

        let len = std::cmp::min(block.len(), dst.len() - offset);
        xor_inplace(&block[0..len], &mut dst[offset..(offset + len)]);
        offset += len;
        counter += 1;
    }
}
