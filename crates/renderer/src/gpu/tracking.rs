use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ObjectKind {
    Shader,
    Program,
    Image,
}

#[derive(Debug, Default)]
struct Counters {
    shaders: AtomicUsize,
    programs: AtomicUsize,
    images: AtomicUsize,
}

impl Counters {
    fn slot(&self, kind: ObjectKind) -> &AtomicUsize {
        match kind {
            ObjectKind::Shader => &self.shaders,
            ObjectKind::Program => &self.programs,
            ObjectKind::Image => &self.images,
        }
    }
}

/// Counts the GPU objects the pipeline currently holds.
///
/// Every compiled shader module, linked pipeline and image texture carries a
/// [`LiveObject`] guard; the count drops when the owning value is dropped,
/// which is also when wgpu releases the underlying handle.
#[derive(Clone, Debug, Default)]
pub struct ObjectLedger {
    counters: Arc<Counters>,
}

/// Snapshot of [`ObjectLedger`] counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct LiveObjects {
    pub shaders: usize,
    pub programs: usize,
    pub images: usize,
}

impl ObjectLedger {
    pub fn snapshot(&self) -> LiveObjects {
        LiveObjects {
            shaders: self.counters.shaders.load(Ordering::Relaxed),
            programs: self.counters.programs.load(Ordering::Relaxed),
            images: self.counters.images.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn track(&self, kind: ObjectKind) -> LiveObject {
        self.counters.slot(kind).fetch_add(1, Ordering::Relaxed);
        LiveObject {
            counters: Arc::clone(&self.counters),
            kind,
        }
    }
}

#[derive(Debug)]
pub(crate) struct LiveObject {
    counters: Arc<Counters>,
    kind: ObjectKind,
}

impl Drop for LiveObject {
    fn drop(&mut self) {
        self.counters.slot(self.kind).fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_balance_counts() {
        let ledger = ObjectLedger::default();
        let shader = ledger.track(ObjectKind::Shader);
        let program = ledger.track(ObjectKind::Program);
        let _image = ledger.track(ObjectKind::Image);
        assert_eq!(
            ledger.snapshot(),
            LiveObjects {
                shaders: 1,
                programs: 1,
                images: 1
            }
        );

        drop(shader);
        drop(program);
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.shaders, 0);
        assert_eq!(snapshot.programs, 0);
        assert_eq!(snapshot.images, 1);
    }

    #[test]
    fn clones_share_counters() {
        let ledger = ObjectLedger::default();
        let other = ledger.clone();
        let _guard = other.track(ObjectKind::Shader);
        assert_eq!(ledger.snapshot().shaders, 1);
    }
}
