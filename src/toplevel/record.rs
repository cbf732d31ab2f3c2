use std::collections::HashSet;
use std::hash::Hash;

use bitflags::bitflags;

bitflags! {
    /// Window state as reported by the compositor.
    ///
    /// Flags are independent except that a compositor will not normally
    /// report a window as both activated and minimized.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ToplevelState: u32 {
        const ACTIVATED = 1 << 0;
        const MAXIMIZED = 1 << 1;
        const MINIMIZED = 1 << 2;
    }
}

/// Everything the window list knows about one toplevel.
///
/// Fields start out empty and are filled in by whatever events arrive first,
/// so every getter is valid right after creation.
#[derive(Clone, Debug)]
pub struct ToplevelRecord<H, O> {
    pub(super) seq: u64,
    pub(super) title: String,
    pub(super) app_id: String,
    pub(super) state: ToplevelState,
    pub(super) parent: Option<H>,
    pub(super) children: Vec<H>,
    pub(super) outputs: HashSet<O>,
    pub(super) visual_attached: bool,
    pub(super) initialized: bool,
}

impl<H, O> ToplevelRecord<H, O>
where
    H: Clone + Eq,
    O: Eq + Hash,
{
    pub(super) fn new(seq: u64) -> Self {
        Self {
            seq,
            title: String::new(),
            app_id: String::new(),
            state: ToplevelState::empty(),
            parent: None,
            children: Vec::new(),
            outputs: HashSet::new(),
            visual_attached: false,
            initialized: false,
        }
    }

    /// Position of this record in creation order.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn state(&self) -> ToplevelState {
        self.state
    }

    pub fn is_activated(&self) -> bool {
        self.state.contains(ToplevelState::ACTIVATED)
    }

    pub fn is_minimized(&self) -> bool {
        self.state.contains(ToplevelState::MINIMIZED)
    }

    pub fn is_maximized(&self) -> bool {
        self.state.contains(ToplevelState::MAXIMIZED)
    }

    pub fn parent(&self) -> Option<&H> {
        self.parent.as_ref()
    }

    /// Handles currently nested under this record, oldest first.
    pub fn children(&self) -> &[H] {
        &self.children
    }

    pub fn outputs(&self) -> &HashSet<O> {
        &self.outputs
    }

    pub fn is_on(&self, output: &O) -> bool {
        self.outputs.contains(output)
    }

    /// Whether the record's entry is currently inserted in the window list.
    pub fn visual_attached(&self) -> bool {
        self.visual_attached
    }

    /// Set once the compositor finished the first batch of updates.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Label shown in the window list; falls back to the app id.
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.app_id
        } else {
            &self.title
        }
    }

    pub(super) fn add_child(&mut self, child: H) -> bool {
        if self.children.contains(&child) {
            return false;
        }
        self.children.push(child);
        true
    }

    pub(super) fn remove_child(&mut self, child: &H) -> bool {
        let before = self.children.len();
        self.children.retain(|candidate| candidate != child);
        before != self.children.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_empty() {
        let record = ToplevelRecord::<u32, u32>::new(7);
        assert_eq!(record.seq(), 7);
        assert_eq!(record.title(), "");
        assert_eq!(record.app_id(), "");
        assert!(record.state().is_empty());
        assert!(record.parent().is_none());
        assert!(record.children().is_empty());
        assert!(record.outputs().is_empty());
        assert!(!record.visual_attached());
        assert!(!record.is_initialized());
    }

    #[test]
    fn children_behave_like_a_set() {
        let mut record = ToplevelRecord::<u32, u32>::new(0);
        assert!(record.add_child(3));
        assert!(!record.add_child(3));
        assert!(record.add_child(1));
        assert_eq!(record.children(), &[3, 1]);

        assert!(record.remove_child(&3));
        assert!(!record.remove_child(&3));
        assert_eq!(record.children(), &[1]);
    }

    #[test]
    fn display_name_prefers_title() {
        let mut record = ToplevelRecord::<u32, u32>::new(0);
        record.app_id = "org.gnome.Nautilus".to_owned();
        assert_eq!(record.display_name(), "org.gnome.Nautilus");

        record.title = "Files".to_owned();
        assert_eq!(record.display_name(), "Files");
    }

    #[test]
    fn state_flags_are_independent() {
        let mut record = ToplevelRecord::<u32, u32>::new(0);
        record.state = ToplevelState::MAXIMIZED | ToplevelState::ACTIVATED;
        assert!(record.is_activated());
        assert!(record.is_maximized());
        assert!(!record.is_minimized());
    }
}
