/// A change to the window-list container, in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingChange<H> {
    Attached { handle: H, position: usize },
    Detached(H),
}

/// The window-list container of the one output this shell instance serves.
///
/// Entries are kept sorted by their record's creation sequence, so the
/// container order always follows registry insertion order no matter in
/// which order attaches happen.
#[derive(Debug)]
pub struct OutputBinding<H, O> {
    output: Option<O>,
    attached: Vec<(u64, H)>,
    changes: Vec<BindingChange<H>>,
}

impl<H, O> OutputBinding<H, O>
where
    H: Clone + Eq,
    O: Eq,
{
    pub fn new(output: Option<O>) -> Self {
        Self {
            output,
            attached: Vec::new(),
            changes: Vec::new(),
        }
    }

    pub fn output(&self) -> Option<&O> {
        self.output.as_ref()
    }

    pub fn is_bound_to(&self, output: &O) -> bool {
        self.output.as_ref() == Some(output)
    }

    pub fn contains(&self, handle: &H) -> bool {
        self.attached.iter().any(|(_, candidate)| candidate == handle)
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }

    /// Attached handles in container order.
    pub fn iter(&self) -> impl Iterator<Item = &H> {
        self.attached.iter().map(|(_, handle)| handle)
    }

    /// Inserts `handle` at the slot matching `seq`. Returns false if it was
    /// already attached.
    pub fn attach(&mut self, handle: H, seq: u64) -> bool {
        if self.contains(&handle) {
            return false;
        }

        let position = self.attached.partition_point(|(other, _)| *other < seq);
        self.attached.insert(position, (seq, handle.clone()));
        self.changes
            .push(BindingChange::Attached { handle, position });
        true
    }

    /// Removes `handle`. Returns false if it was not attached.
    pub fn detach(&mut self, handle: &H) -> bool {
        let Some(index) = self
            .attached
            .iter()
            .position(|(_, candidate)| candidate == handle)
        else {
            return false;
        };

        let (_, handle) = self.attached.remove(index);
        self.changes.push(BindingChange::Detached(handle));
        true
    }

    /// Switches to another output (or none), emptying the container.
    ///
    /// Returns the handles that were attached so the caller can clear their
    /// records' attached flag.
    pub fn rebind(&mut self, output: Option<O>) -> Vec<H> {
        self.output = output;
        let detached: Vec<H> = self
            .attached
            .drain(..)
            .map(|(_, handle)| handle)
            .collect();
        self.changes
            .extend(detached.iter().cloned().map(BindingChange::Detached));
        detached
    }

    pub fn drain_changes(&mut self) -> Vec<BindingChange<H>> {
        std::mem::take(&mut self.changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_and_detach_are_idempotent() {
        let mut binding = OutputBinding::<u32, u32>::new(Some(1));
        assert!(binding.attach(10, 0));
        assert!(!binding.attach(10, 0));
        assert_eq!(binding.len(), 1);

        assert!(binding.detach(&10));
        assert!(!binding.detach(&10));
        assert!(binding.is_empty());

        assert_eq!(
            binding.drain_changes(),
            vec![
                BindingChange::Attached {
                    handle: 10,
                    position: 0
                },
                BindingChange::Detached(10),
            ]
        );
        assert!(binding.drain_changes().is_empty());
    }

    #[test]
    fn order_follows_sequence_not_attach_order() {
        let mut binding = OutputBinding::<&str, u32>::new(Some(1));
        binding.attach("third", 30);
        binding.attach("first", 10);
        binding.attach("second", 20);

        let order: Vec<_> = binding.iter().copied().collect();
        assert_eq!(order, vec!["first", "second", "third"]);

        let changes = binding.drain_changes();
        assert_eq!(
            changes[2],
            BindingChange::Attached {
                handle: "second",
                position: 1
            }
        );
    }

    #[test]
    fn rebind_empties_the_container() {
        let mut binding = OutputBinding::<u32, u32>::new(None);
        assert!(binding.output().is_none());
        binding.attach(1, 0);
        binding.attach(2, 1);
        binding.drain_changes();

        let detached = binding.rebind(Some(5));
        assert_eq!(detached, vec![1, 2]);
        assert!(binding.is_bound_to(&5));
        assert!(binding.is_empty());
        assert_eq!(
            binding.drain_changes(),
            vec![BindingChange::Detached(1), BindingChange::Detached(2)]
        );
    }
}
