use parking_lot::Mutex;
use uuid::Uuid;

/// Trait for generating correlation tokens.
/// Decouples callers from `Uuid::new_v4()` so tests can be deterministic.
pub trait IdProvider: Send + Sync {
    fn new_id(&self) -> String;
}

pub struct RandomIdProvider;

impl IdProvider for RandomIdProvider {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

pub struct DeterministicIdProvider {
    counter: Mutex<u64>,
}

impl DeterministicIdProvider {
    pub fn new() -> Self {
        Self {
            counter: Mutex::new(0),
        }
    }
}

impl Default for DeterministicIdProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdProvider for DeterministicIdProvider {
    fn new_id(&self) -> String {
        let mut num = self.counter.lock();
        *num += 1;
        // Recognizable prefix so test tokens stand out in logs
        format!("00000000-0000-0000-0000-{:012x}", *num)
    }
}
