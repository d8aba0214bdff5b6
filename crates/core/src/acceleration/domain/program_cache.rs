use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use sha2::{Digest, Sha256};

use crate::shared::error::DetectionError;

/// Stable identity of a compute device, hashed into program keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceFingerprint(String);

impl DeviceFingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A device programs can be built for.
pub trait ProgramTarget {
    type Binary: Send + Sync;

    fn fingerprint(&self) -> DeviceFingerprint;

    /// Build `source` for this device. The error is the device's
    /// diagnostic log.
    fn compile(&self, source: &str) -> Result<Self::Binary, String>;
}

/// 256-bit content key of (source text, device set).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramKey([u8; 32]);

impl ProgramKey {
    /// `SHA-256(source)` XOR-folded with `SHA-256(index || fingerprint)` of
    /// every device. The index keeps two identical devices from cancelling
    /// each other out of the key.
    pub fn derive(source: &str, fingerprints: &[DeviceFingerprint]) -> Self {
        let mut key: [u8; 32] = Sha256::digest(source.as_bytes()).into();
        for (idx, fp) in fingerprints.iter().enumerate() {
            let mut hasher = Sha256::new();
            hasher.update((idx as u64).to_le_bytes());
            hasher.update(fp.as_str().as_bytes());
            let device_hash: [u8; 32] = hasher.finalize().into();
            for (k, d) in key.iter_mut().zip(device_hash) {
                *k ^= d;
            }
        }
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProgramKey(")?;
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "…)")
    }
}

/// One binary per requested device, in request order.
pub struct CompiledProgram<B> {
    binaries: Vec<(DeviceFingerprint, B)>,
}

impl<B> CompiledProgram<B> {
    pub fn binaries(&self) -> &[(DeviceFingerprint, B)] {
        &self.binaries
    }

    pub fn for_device(&self, fingerprint: &DeviceFingerprint) -> Option<&B> {
        self.binaries
            .iter()
            .find(|(fp, _)| fp == fingerprint)
            .map(|(_, b)| b)
    }
}

/// Build `source` on every device, bypassing any cache.
///
/// All devices are attempted even after a failure so the returned error
/// carries every failing device's log.
pub fn compile_program<T: ProgramTarget>(
    source: &str,
    devices: &[T],
) -> Result<CompiledProgram<T::Binary>, DetectionError> {
    if devices.is_empty() {
        return Err(DetectionError::InvalidArgument(
            "no devices to compile for".into(),
        ));
    }
    let mut binaries = Vec::with_capacity(devices.len());
    let mut failures = Vec::new();
    for device in devices {
        let fingerprint = device.fingerprint();
        match device.compile(source) {
            Ok(binary) => binaries.push((fingerprint, binary)),
            Err(log) => failures.push(format!("[{fingerprint}] {log}")),
        }
    }
    if !failures.is_empty() {
        return Err(DetectionError::CompilationFailure {
            log: failures.join("\n"),
        });
    }
    Ok(CompiledProgram { binaries })
}

/// Content-addressed store of compiled programs.
///
/// Lives for the whole process and never evicts. The lock is held only
/// around map access; two threads missing on the same key both compile and
/// the later insert wins.
pub struct ProgramCache<B> {
    entries: RwLock<HashMap<ProgramKey, Arc<CompiledProgram<B>>>>,
    compilations: AtomicUsize,
}

impl<B: Send + Sync> ProgramCache<B> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            compilations: AtomicUsize::new(0),
        }
    }

    /// Cached program for `(source, devices)`, compiling it on a miss.
    pub fn get_or_compile<T>(
        &self,
        source: &str,
        devices: &[T],
    ) -> Result<Arc<CompiledProgram<B>>, DetectionError>
    where
        T: ProgramTarget<Binary = B>,
    {
        if devices.is_empty() {
            return Err(DetectionError::InvalidArgument(
                "no devices to compile for".into(),
            ));
        }
        let fingerprints: Vec<DeviceFingerprint> =
            devices.iter().map(ProgramTarget::fingerprint).collect();
        let key = ProgramKey::derive(source, &fingerprints);

        if let Some(hit) = self.get(&key) {
            log::debug!("Program cache hit for {key:?}");
            return Ok(hit);
        }

        log::info!(
            "Compiling program ({} bytes) for {} device(s)",
            source.len(),
            devices.len()
        );
        self.compilations.fetch_add(1, Ordering::Relaxed);
        let program = Arc::new(compile_program(source, devices)?);
        self.insert(key, Arc::clone(&program));
        Ok(program)
    }

    pub fn get(&self, key: &ProgramKey) -> Option<Arc<CompiledProgram<B>>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store a program under `key`, replacing any existing entry.
    pub fn insert(&self, key: ProgramKey, program: Arc<CompiledProgram<B>>) {
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, program);
        if previous.is_some() {
            log::debug!("Program {key:?} compiled concurrently; keeping the latest build");
        }
    }

    /// Number of compilations started through `get_or_compile`.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<B: Send + Sync> Default for ProgramCache<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FakeDevice {
        name: &'static str,
        error: Option<&'static str>,
        builds: Arc<AtomicUsize>,
    }

    impl FakeDevice {
        fn ok(name: &'static str) -> Self {
            Self {
                name,
                error: None,
                builds: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(name: &'static str, error: &'static str) -> Self {
            Self {
                error: Some(error),
                ..Self::ok(name)
            }
        }
    }

    impl ProgramTarget for FakeDevice {
        type Binary = String;

        fn fingerprint(&self) -> DeviceFingerprint {
            DeviceFingerprint::new(self.name)
        }

        fn compile(&self, source: &str) -> Result<String, String> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            match self.error {
                Some(e) => Err(e.to_string()),
                None => Ok(format!("{}:{}", self.name, source.len())),
            }
        }
    }

    const SOURCE: &str = "fn main() {}";

    #[test]
    fn test_second_call_is_served_from_cache() {
        let cache = ProgramCache::new();
        let devices = [FakeDevice::ok("gpu-a")];

        let first = cache.get_or_compile(SOURCE, &devices).unwrap();
        let second = cache.get_or_compile(SOURCE, &devices).unwrap();

        assert_eq!(cache.compilations(), 1);
        assert_eq!(devices[0].builds.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.binaries()[0].1, "gpu-a:12");
    }

    #[test]
    fn test_different_source_or_device_misses() {
        let cache = ProgramCache::new();
        cache
            .get_or_compile(SOURCE, &[FakeDevice::ok("gpu-a")])
            .unwrap();
        cache
            .get_or_compile("fn other() {}", &[FakeDevice::ok("gpu-a")])
            .unwrap();
        cache
            .get_or_compile(SOURCE, &[FakeDevice::ok("gpu-b")])
            .unwrap();
        assert_eq!(cache.compilations(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_binaries_follow_device_order() {
        let cache = ProgramCache::new();
        let program = cache
            .get_or_compile(SOURCE, &[FakeDevice::ok("gpu-a"), FakeDevice::ok("gpu-b")])
            .unwrap();
        let names: Vec<&str> = program
            .binaries()
            .iter()
            .map(|(fp, _)| fp.as_str())
            .collect();
        assert_eq!(names, vec!["gpu-a", "gpu-b"]);
        assert_eq!(
            program.for_device(&DeviceFingerprint::new("gpu-b")),
            Some(&"gpu-b:12".to_string())
        );
    }

    #[test]
    fn test_failure_aggregates_every_device_log_and_caches_nothing() {
        let cache = ProgramCache::new();
        let devices = [
            FakeDevice::failing("gpu-a", "unknown identifier `foo`"),
            FakeDevice::ok("gpu-b"),
            FakeDevice::failing("gpu-c", "out of registers"),
        ];
        let err = cache.get_or_compile(SOURCE, &devices).err().unwrap();
        match err {
            DetectionError::CompilationFailure { log } => {
                assert!(log.contains("[gpu-a] unknown identifier `foo`"));
                assert!(log.contains("[gpu-c] out of registers"));
                assert!(!log.contains("gpu-b"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // every device was attempted
        assert!(devices.iter().all(|d| d.builds.load(Ordering::SeqCst) == 1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_empty_device_list_is_invalid_argument() {
        let cache: ProgramCache<String> = ProgramCache::new();
        let err = cache
            .get_or_compile::<FakeDevice>(SOURCE, &[])
            .err()
            .unwrap();
        assert!(matches!(err, DetectionError::InvalidArgument(_)));
    }

    #[test]
    fn test_preseeded_entry_is_used_without_compiling() {
        let cache = ProgramCache::new();
        let device = FakeDevice::ok("gpu-a");
        let key = ProgramKey::derive(SOURCE, &[device.fingerprint()]);
        cache.insert(
            key,
            Arc::new(CompiledProgram {
                binaries: vec![(device.fingerprint(), "seeded".to_string())],
            }),
        );

        let program = cache.get_or_compile(SOURCE, &[device]).unwrap();
        assert_eq!(program.binaries()[0].1, "seeded");
        assert_eq!(cache.compilations(), 0);
    }

    #[test]
    fn test_key_depends_on_device_position_and_duplicates_do_not_cancel() {
        let a = DeviceFingerprint::new("gpu-a");
        let b = DeviceFingerprint::new("gpu-b");
        let source_only = ProgramKey::derive(SOURCE, &[]);
        let twin = ProgramKey::derive(SOURCE, &[a.clone(), a.clone()]);
        assert_ne!(twin, source_only);
        assert_ne!(
            ProgramKey::derive(SOURCE, &[a.clone(), b.clone()]),
            ProgramKey::derive(SOURCE, &[b, a])
        );
    }

    #[test]
    fn test_concurrent_misses_leave_one_consistent_entry() {
        let cache = ProgramCache::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let program = cache
                        .get_or_compile(SOURCE, &[FakeDevice::ok("gpu-a")])
                        .unwrap();
                    assert_eq!(program.binaries()[0].1, "gpu-a:12");
                });
            }
        });
        assert_eq!(cache.len(), 1);
        assert!((1..=8).contains(&cache.compilations()));
    }
}
