use zeroize::Zeroizing;

use crate::hasher::*;
use crate::utils::xor;

const IPAD: u8 = 0x36;
const OPAD: u8 = 0x5c;

/// Descriptor for one HMAC instantiation (RFC 2104) as negotiated on the
/// SSH-2 wire.
pub struct MacAlgorithm {
    /// Name under which the algorithm is negotiated.
    pub name: &'static str,

    pub hash: fn() -> HasherFactory,

    /// Number of digest bytes emitted on the wire (<= the hash output size).
    pub output_size: usize,

    /// Number of bytes of h(K) retained when the key exceeds the block size.
    ///
    /// The correct value is the full digest size. The "buggy" descriptors
    /// keep only 16 bytes, matching peers that reuse an MD5-sized buffer for
    /// the derived key.
    pub key_digest_limit: usize,
}

pub static HMAC_MD5: MacAlgorithm = MacAlgorithm {
    name: "hmac-md5",
    hash: MD5Hasher::factory,
    output_size: 16,
    key_digest_limit: 16,
};

pub static HMAC_SHA1: MacAlgorithm = MacAlgorithm {
    name: "hmac-sha1",
    hash: SHA1Hasher::factory,
    output_size: 20,
    key_digest_limit: 20,
};

pub static HMAC_SHA1_96: MacAlgorithm = MacAlgorithm {
    name: "hmac-sha1-96",
    hash: SHA1Hasher::factory,
    output_size: 12,
    key_digest_limit: 20,
};

pub static HMAC_SHA2_256: MacAlgorithm = MacAlgorithm {
    name: "hmac-sha2-256",
    hash: SHA256Hasher::factory,
    output_size: 32,
    key_digest_limit: 32,
};

/// Interop variant for peers that truncate h(K) to 16 bytes when keying
/// with an oversized key. Wire name and output length match HMAC_SHA1.
pub static HMAC_SHA1_BUGGY: MacAlgorithm = MacAlgorithm {
    name: "hmac-sha1",
    hash: SHA1Hasher::factory,
    output_size: 16,
    key_digest_limit: 16,
};

/// Same keying quirk as HMAC_SHA1_BUGGY with 96-bit output.
pub static HMAC_SHA1_96_BUGGY: MacAlgorithm = MacAlgorithm {
    name: "hmac-sha1-96",
    hash: SHA1Hasher::factory,
    output_size: 12,
    key_digest_limit: 16,
};

/// Keyed HMAC context. https://tools.ietf.org/html/rfc2104
///
/// The two pad-keyed hash states are computed once per key; each message
/// clones the inner state via start() and folds the result through the outer
/// state in finish().
pub struct Mac {
    alg: &'static MacAlgorithm,

    /// Hash state seeded with 'derived_key xor ipad'.
    inner: Box<dyn Hasher>,

    /// Hash state seeded with 'derived_key xor opad'.
    outer: Box<dyn Hasher>,

    /// State absorbing the current message. None until start() is called.
    live: Option<Box<dyn Hasher>>,
}

impl Mac {
    pub fn new(alg: &'static MacAlgorithm, key: &[u8]) -> Self {
        let factory = (alg.hash)();
        let block_size = factory.create().block_size();

        let mut derived_key = Zeroizing::new(vec![0u8; block_size]);
        if key.len() <= block_size {
            derived_key[0..key.len()].copy_from_slice(key);
        } else {
            let key_hash = Zeroizing::new(factory.create().finish_with(key));
            let n = std::cmp::min(key_hash.len(), alg.key_digest_limit);
            derived_key[0..n].copy_from_slice(&key_hash[0..n]);
        }

        let mut inner = factory.create();
        let mut outer = factory.create();

        let mut pad = Zeroizing::new(vec![0u8; block_size]);
        xor(&vec![IPAD; block_size], &derived_key, &mut pad);
        inner.update(&pad);
        xor(&vec![OPAD; block_size], &derived_key, &mut pad);
        outer.update(&pad);

        Self {
            alg,
            inner,
            outer,
            live: None,
        }
    }

    /// Rekeys the context, discarding any message in progress.
    pub fn set_key(&mut self, key: &[u8]) {
        *self = Self::new(self.alg, key);
    }

    pub fn algorithm(&self) -> &'static MacAlgorithm {
        self.alg
    }

    pub fn output_size(&self) -> usize {
        self.alg.output_size
    }

    /// Begins a new message.
    pub fn start(&mut self) {
        self.live = Some(self.inner.box_clone());
    }

    pub fn update(&mut self, data: &[u8]) {
        self.live
            .as_mut()
            .expect("update() called before start()")
            .update(data);
    }

    /// Finalizes the current message and returns the (truncated) MAC.
    pub fn finish(&mut self) -> Vec<u8> {
        let live = self.live.take().expect("finish() called before start()");
        let digest = Zeroizing::new(live.finish());

        let mut outer = self.outer.box_clone();
        outer.update(&digest);
        let mut out = outer.finish();
        out.truncate(self.alg.output_size);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(alg: &'static MacAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut m = Mac::new(alg, key);
        m.start();
        m.update(data);
        m.finish()
    }

    #[test]
    fn hmac_rfc2202_test() {
        // RFC 2202 test case 1.
        assert_eq!(
            mac(&HMAC_MD5, &[0x0b; 16], b"Hi There"),
            hex::decode("9294727a3638bb1c13f48ef8158bfc9d").unwrap()
        );
        assert_eq!(
            mac(&HMAC_SHA1, &[0x0b; 20], b"Hi There"),
            hex::decode("b617318655057264e28bc0b6fb378c8ef146be00").unwrap()
        );
        assert_eq!(
            mac(&HMAC_SHA1_96, &[0x0b; 20], b"Hi There"),
            hex::decode("b617318655057264e28bc0b6fb378c8e").unwrap()[0..12]
        );

        // RFC 2202 test case 2.
        assert_eq!(
            mac(&HMAC_MD5, b"Jefe", b"what do ya want for nothing?"),
            hex::decode("750c783e6ab0b503eaa86e310a5db738").unwrap()
        );
        assert_eq!(
            mac(&HMAC_SHA1, b"Jefe", b"what do ya want for nothing?"),
            hex::decode("effcdf6ae5eb2fa2d27416d5f184df9c259a7c79").unwrap()
        );

        // RFC 2202 test case 6 (key larger than the block size).
        assert_eq!(
            mac(
                &HMAC_SHA1,
                &[0xaa; 80],
                b"Test Using Larger Than Block-Size Key - First Block"
            ),
            hex::decode("aa4ae5e15272d00e95705637ce8a3b55ed402112").unwrap()
        );
        assert_eq!(
            mac(
                &HMAC_MD5,
                &[0xaa; 80],
                b"Test Using Larger Than Block-Size Key - First Block"
            ),
            hex::decode("6b1ab7fe4bd7bf8f0b62e6ce61b9d0cd").unwrap()
        );
    }

    #[test]
    fn hmac_sha2_256_test() {
        // RFC 4231 test case 1.
        assert_eq!(
            mac(&HMAC_SHA2_256, &[0x0b; 20], b"Hi There"),
            hex::decode("b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7")
                .unwrap()
        );
    }

    #[test]
    fn hmac_test() {
        let data = b"The quick brown fox jumps over the lazy dog";
        assert_eq!(
            mac(&HMAC_MD5, b"key", data),
            hex::decode("80070713463e7749b90c2dc24911e275").unwrap()
        );
        assert_eq!(
            mac(&HMAC_SHA1, b"key", data),
            hex::decode("de7c9b85b8b78aa6bc8a7a36f70a90701c9db4d9").unwrap()
        );
        assert_eq!(
            mac(&HMAC_SHA2_256, b"key", data),
            hex::decode("f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8")
                .unwrap()
        );
    }

    #[test]
    fn hmac_buggy_keying_test() {
        // For keys at or below the block size the quirk never engages.
        let short = mac(&HMAC_SHA1, &[0x0b; 20], b"Hi There");
        assert_eq!(mac(&HMAC_SHA1_BUGGY, &[0x0b; 20], b"Hi There"), short[0..16]);
        assert_eq!(
            mac(&HMAC_SHA1_96_BUGGY, &[0x0b; 20], b"Hi There"),
            short[0..12]
        );

        // An oversized key engages the truncated h(K) and changes the MAC.
        let good = mac(&HMAC_SHA1, &[0xaa; 80], b"data");
        let buggy = mac(&HMAC_SHA1_BUGGY, &[0xaa; 80], b"data");
        assert_ne!(good[0..16], buggy[..]);

        let buggy96 = mac(&HMAC_SHA1_96_BUGGY, &[0xaa; 80], b"data");
        assert_eq!(buggy96[..], buggy[0..12]);
    }

    #[test]
    fn hmac_incremental_test() {
        let mut m = Mac::new(&HMAC_SHA1, b"key");
        m.start();
        m.update(b"The quick brown fox ");
        m.update(b"jumps over the lazy dog");
        let split = m.finish();

        // The context is reusable for further messages.
        m.start();
        m.update(b"The quick brown fox jumps over the lazy dog");
        assert_eq!(split, m.finish());

        m.set_key(b"other key");
        m.start();
        m.update(b"The quick brown fox jumps over the lazy dog");
        assert_ne!(split, m.finish());
    }

    #[test]
    #[should_panic]
    fn hmac_update_before_start_test() {
        let mut m = Mac::new(&HMAC_SHA1, b"key");
        m.update(b"data");
    }
}
