use anyhow::{anyhow, Result};
use num_bigint::BigUint;

use crate::hasher::*;
use crate::rsa::{RSAKey, RSA_SHA1};
use crate::wire::{Reader, Writer};

pub const SSH_RSA_NAME: &str = "ssh-rsa";

/// Field order of the two mpints inside an SSH-1 public key blob.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ssh1Order {
    ExponentFirst,
    ModulusFirst,
}

/// Result of parsing an SSH-1 public key: the key, the number of input
/// bytes consumed, and the borrowed modulus magnitude (callers hash the raw
/// key bytes for session ids).
pub struct Ssh1PublicKey<'a> {
    pub key: RSAKey,
    pub consumed: usize,
    pub modulus_magnitude: &'a [u8],
}

/// Reads '<u32 nominal bit count> <mpint> <mpint>' from the front of
/// 'data', tolerating trailing bytes. Fails on truncated input or a
/// zero-bit modulus.
pub fn rsa_ssh1_read_public(data: &[u8], order: Ssh1Order) -> Result<Ssh1PublicKey> {
    let mut r = Reader::new(data);
    let bits = r.read_u32()? as usize;

    let first = r.read_mpint_ssh1()?;
    let second = r.read_mpint_ssh1()?;
    let consumed = r.position();

    let (exponent, modulus) = match order {
        Ssh1Order::ExponentFirst => (first, second),
        Ssh1Order::ModulusFirst => (second, first),
    };

    if modulus.value.bits() == 0 {
        return Err(anyhow!("Zero-length modulus"));
    }

    // The PKCS#1 block size for this key is the modulus length exactly as
    // encoded, which may carry leading zero bytes.
    let bytes = modulus.encoded_len() - 2;

    Ok(Ssh1PublicKey {
        key: RSAKey {
            bits,
            bytes,
            modulus: modulus.value,
            exponent: exponent.value,
            ..Default::default()
        },
        consumed,
        modulus_magnitude: modulus.magnitude,
    })
}

/// Writes the SSH-1 public blob for 'key' in the given field order.
pub fn rsa_ssh1_write_public(w: &mut Writer, key: &RSAKey, order: Ssh1Order) {
    w.write_u32(key.bits as u32);
    match order {
        Ssh1Order::ExponentFirst => {
            w.write_mpint_ssh1(&key.exponent);
            w.write_mpint_ssh1(&key.modulus);
        }
        Ssh1Order::ModulusFirst => {
            w.write_mpint_ssh1(&key.modulus);
            w.write_mpint_ssh1(&key.exponent);
        }
    }
}

/// "ssh-rsa" public blob: name string, then e and n as SSH-2 mpints.
/// https://tools.ietf.org/html/rfc4253#section-6.6
pub fn rsa_ssh2_public_blob(key: &RSAKey) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_string(SSH_RSA_NAME.as_bytes());
    w.write_mpint(&key.exponent);
    w.write_mpint(&key.modulus);
    w.into_bytes()
}

/// The private half paired with the public blob: d, p, q, iqmp.
pub fn rsa_ssh2_private_blob(key: &RSAKey) -> Vec<u8> {
    let msg = "private blob of a public-only key";
    let mut w = Writer::new();
    w.write_mpint(key.private_exponent.as_ref().expect(msg));
    w.write_mpint(key.p.as_ref().expect(msg));
    w.write_mpint(key.q.as_ref().expect(msg));
    w.write_mpint(key.iqmp.as_ref().expect(msg));
    w.into_bytes()
}

pub fn rsa_ssh2_read_public(blob: &[u8]) -> Result<RSAKey> {
    let mut r = Reader::new(blob);
    let name = r.read_string()?;
    if name != SSH_RSA_NAME.as_bytes() {
        return Err(anyhow!("Not an ssh-rsa key blob"));
    }

    let exponent = r.read_mpint()?;
    let modulus = r.read_mpint()?;
    Ok(RSAKey::from_public(modulus, exponent))
}

/// Combines an "ssh-rsa" public blob with its d/p/q/iqmp private blob. The
/// caller runs verify() before using the key for private operations.
pub fn rsa_ssh2_from_blobs(public_blob: &[u8], private_blob: &[u8]) -> Result<RSAKey> {
    let mut key = rsa_ssh2_read_public(public_blob)?;

    let mut r = Reader::new(private_blob);
    key.private_exponent = Some(r.read_mpint()?);
    key.p = Some(r.read_mpint()?);
    key.q = Some(r.read_mpint()?);
    key.iqmp = Some(r.read_mpint()?);
    Ok(key)
}

/// OpenSSH private key field order: n, e, d, iqmp, p, q. Verification is
/// mandatory on this path, canonicalizing the prime order as a side effect.
pub fn rsa_openssh_read(blob: &[u8]) -> Result<RSAKey> {
    let mut r = Reader::new(blob);
    let modulus = r.read_mpint()?;
    let exponent = r.read_mpint()?;

    let mut key = RSAKey::from_public(modulus, exponent);
    key.private_exponent = Some(r.read_mpint()?);
    key.iqmp = Some(r.read_mpint()?);
    key.p = Some(r.read_mpint()?);
    key.q = Some(r.read_mpint()?);

    if !key.verify() {
        return Err(anyhow!("Inconsistent RSA private key"));
    }
    Ok(key)
}

/// Emits the OpenSSH private key field order for 'key'.
pub fn rsa_openssh_write(key: &RSAKey) -> Vec<u8> {
    let msg = "OpenSSH blob of a public-only key";
    let mut w = Writer::new();
    w.write_mpint(&key.modulus);
    w.write_mpint(&key.exponent);
    w.write_mpint(key.private_exponent.as_ref().expect(msg));
    w.write_mpint(key.iqmp.as_ref().expect(msg));
    w.write_mpint(key.p.as_ref().expect(msg));
    w.write_mpint(key.q.as_ref().expect(msg));
    w.into_bytes()
}

/// MD5 fingerprint in the SSH-1 style: "<bits> xx:..:xx [comment]". The
/// digest covers the SSH-1 mpint encodings of the modulus then the exponent.
pub fn rsa_fingerprint(key: &RSAKey) -> String {
    let mut w = Writer::new();
    w.write_mpint_ssh1(&key.modulus);
    w.write_mpint_ssh1(&key.exponent);
    let digest = MD5Hasher::factory().create().finish_with(&w.into_bytes());

    let mut out = format!("{} ", key.bit_count());
    for (i, b) in digest.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        out.push_str(&format!("{:02x}", b));
    }

    if let Some(comment) = &key.comment {
        out.push(' ');
        out.push_str(comment);
    }
    out
}

/// Upper bound on the length of rsa_format()'s output: four characters per
/// 16-bit group of each value plus the fixed decoration.
pub fn rsa_format_len(key: &RSAKey) -> usize {
    let groups = |x: &BigUint| (x.bits() as usize + 15) / 16;
    4 * (groups(&key.modulus) + groups(&key.exponent)) + 20
}

/// Human readable rendition: "0x<e>,0x<n>" with minimal hex digit counts.
pub fn rsa_format(key: &RSAKey) -> String {
    let mut out = String::with_capacity(rsa_format_len(key));
    out.push_str(&format!("0x{:x},0x{:x}", key.exponent, key.modulus));
    out
}

/// Function set exposed by every key understood by the transport,
/// independent of the algorithm that produced it.
pub trait SshKey {
    fn algorithm_name(&self) -> &'static str;
    fn format(&self) -> String;
    fn public_blob(&self) -> Vec<u8>;
    fn private_blob(&self) -> Vec<u8>;
    fn openssh_blob(&self) -> Vec<u8>;
    fn fingerprint(&self) -> String;
    fn bit_count(&self) -> usize;
    fn sign(&self, data: &[u8]) -> Vec<u8>;
    fn verify_signature(&self, signature: &[u8], data: &[u8]) -> bool;
    fn comment(&self) -> Option<&str>;
    fn set_comment(&mut self, comment: &str);
}

impl SshKey for RSAKey {
    fn algorithm_name(&self) -> &'static str {
        SSH_RSA_NAME
    }

    fn format(&self) -> String {
        rsa_format(self)
    }

    fn public_blob(&self) -> Vec<u8> {
        rsa_ssh2_public_blob(self)
    }

    fn private_blob(&self) -> Vec<u8> {
        rsa_ssh2_private_blob(self)
    }

    fn openssh_blob(&self) -> Vec<u8> {
        rsa_openssh_write(self)
    }

    fn fingerprint(&self) -> String {
        rsa_fingerprint(self)
    }

    fn bit_count(&self) -> usize {
        RSAKey::bit_count(self)
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        RSAKey::sign(self, &RSA_SHA1, data)
    }

    fn verify_signature(&self, signature: &[u8], data: &[u8]) -> bool {
        RSAKey::verify_signature(self, &RSA_SHA1, signature, data)
    }

    fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    fn set_comment(&mut self, comment: &str) {
        self.comment = Some(comment.to_string());
    }
}

/// Registry-facing descriptor for one public key algorithm: everything
/// needed to instantiate keys of that algorithm from wire material.
pub trait KeyAlgorithm: Send + Sync {
    fn name(&self) -> &'static str;

    fn new_public(&self, public_blob: &[u8]) -> Result<Box<dyn SshKey>>;

    fn new_private(&self, public_blob: &[u8], private_blob: &[u8]) -> Result<Box<dyn SshKey>>;

    fn new_openssh(&self, blob: &[u8]) -> Result<Box<dyn SshKey>>;

    /// Number of mpints in the OpenSSH private key layout.
    fn private_component_count(&self) -> usize;

    /// Modulus size of a public blob without retaining the key.
    fn public_bits(&self, public_blob: &[u8]) -> Result<usize>;
}

pub struct SshRsaAlgorithm;

pub static SSH_RSA: SshRsaAlgorithm = SshRsaAlgorithm;

impl KeyAlgorithm for SshRsaAlgorithm {
    fn name(&self) -> &'static str {
        SSH_RSA_NAME
    }

    fn new_public(&self, public_blob: &[u8]) -> Result<Box<dyn SshKey>> {
        Ok(Box::new(rsa_ssh2_read_public(public_blob)?))
    }

    fn new_private(&self, public_blob: &[u8], private_blob: &[u8]) -> Result<Box<dyn SshKey>> {
        Ok(Box::new(rsa_ssh2_from_blobs(public_blob, private_blob)?))
    }

    fn new_openssh(&self, blob: &[u8]) -> Result<Box<dyn SshKey>> {
        Ok(Box::new(rsa_openssh_read(blob)?))
    }

    fn private_component_count(&self) -> usize {
        6
    }

    fn public_bits(&self, public_blob: &[u8]) -> Result<usize> {
        Ok(rsa_ssh2_read_public(public_blob)?.bit_count())
    }
}

/// RSA key exchange method (RFC 4432): the server offers a transient key
/// and the client OAEP-encrypts the exchanged secret to it.
pub struct RsaKexAlgorithm {
    pub name: &'static str,
    pub hash: fn() -> HasherFactory,

    /// Smallest transient key modulus the method permits.
    pub min_key_bits: usize,
}

pub static RSA1024_SHA1: RsaKexAlgorithm = RsaKexAlgorithm {
    name: "rsa1024-sha1",
    hash: SHA1Hasher::factory,
    min_key_bits: 1024,
};

pub static RSA2048_SHA256: RsaKexAlgorithm = RsaKexAlgorithm {
    name: "rsa2048-sha256",
    hash: SHA256Hasher::factory,
    min_key_bits: 2048,
};

impl RsaKexAlgorithm {
    /// Largest secret this method can encrypt to 'key'.
    pub fn max_plaintext_len(&self, key: &RSAKey) -> usize {
        let hlen = (self.hash)().create().output_size();
        key.byte_count() - 2 * hlen - 2
    }

    /// OAEP encryption of the exchanged secret with this method's hash.
    pub fn encrypt(&self, key: &RSAKey, plaintext: &[u8]) -> Vec<u8> {
        key.encrypt_oaep(&(self.hash)(), plaintext)
    }
}
