use std::sync::{Mutex, MutexGuard};

/// Lock a shared coordinator resource, recovering the guard when a panicking
/// holder poisoned it so the microphone or speaker can still be released.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            crate::log_debug(&format!("Mutex poisoned in {context}; recovering"));
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn recovers_poisoned_mutex() {
        let shared = Arc::new(Mutex::new(7u32));
        let clone = shared.clone();
        let _ = thread::spawn(move || {
            let _guard = clone.lock().expect("first lock");
            panic!("poison the lock");
        })
        .join();
        assert!(shared.is_poisoned());
        let guard = lock_or_recover(&shared, "test");
        assert_eq!(*guard, 7);
    }
}
