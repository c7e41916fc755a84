use digest::core_api::BlockSizeUser;
use digest::Digest;

/// Encapsulates an algorithm for creating hashes (i.e. MD5, SHA1, SHA256).
pub trait Hasher: Send {
    fn block_size(&self) -> usize;

    /// Should return the expected size of the output digest in bytes.
    fn output_size(&self) -> usize;

    /// Appends some data to the internal state of the hasher.
    fn update(&mut self, data: &[u8]);

    /// Finalizes the hash and outputs the full hash of all data accumulated
    /// by calls to update().
    ///
    /// NOTE: It is valid to call update() after finish() is called (in which
    /// case all further calls to finish() will still be cumulative since the
    /// construction of this struct).
    fn finish(&self) -> Vec<u8>;

    fn finish_with(&mut self, data: &[u8]) -> Vec<u8> {
        self.update(data);
        self.finish()
    }

    /// Should create a cloned copy of this hasher such that the new and old
    /// hashers effectively have all data seen by update() applied already.
    fn box_clone(&self) -> Box<dyn Hasher>;
}

pub trait Factory<T: ?Sized>: Send + Sync {
    fn create(&self) -> Box<T>;

    fn box_clone(&self) -> Box<dyn Factory<T>>;
}

pub type HasherFactory = Box<dyn Factory<dyn Hasher>>;

pub struct DefaultHasherFactory<T> {
    t: std::marker::PhantomData<T>,
}

impl<T> DefaultHasherFactory<T> {
    pub fn new() -> Self {
        Self {
            t: std::marker::PhantomData,
        }
    }
}

impl<T: Hasher + Default + Sync + 'static> Factory<dyn Hasher> for DefaultHasherFactory<T> {
    fn create(&self) -> Box<dyn Hasher> {
        Box::new(T::default())
    }

    fn box_clone(&self) -> HasherFactory {
        Box::new(Self::new())
    }
}

pub trait GetHasherFactory {
    fn factory() -> HasherFactory;
}

impl<T: 'static + Default + Sync + Hasher> GetHasherFactory for T {
    fn factory() -> HasherFactory {
        Box::new(DefaultHasherFactory::<T>::new())
    }
}

/// Exposes any incremental digest implementation through the Hasher
/// interface. The compression functions themselves live in external crates;
/// this core only consumes their init/update/finalize/clone surface.
#[derive(Default, Clone)]
pub struct DigestHasher<D> {
    inner: D,
}

impl<D: Digest + BlockSizeUser + Clone + Send + Sync + 'static> Hasher for DigestHasher<D> {
    fn block_size(&self) -> usize {
        D::block_size()
    }

    fn output_size(&self) -> usize {
        <D as Digest>::output_size()
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.inner, data);
    }

    fn finish(&self) -> Vec<u8> {
        self.inner.clone().finalize().to_vec()
    }

    fn box_clone(&self) -> Box<dyn Hasher> {
        Box::new(self.clone())
    }
}

pub type MD5Hasher = DigestHasher<md5::Md5>;
pub type SHA1Hasher = DigestHasher<sha1::Sha1>;
pub type SHA256Hasher = DigestHasher<sha2::Sha256>;
pub type SHA512Hasher = DigestHasher<sha2::Sha512>;
