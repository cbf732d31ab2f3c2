use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::str::FromStr;

use super::binding::{BindingChange, OutputBinding};
use super::record::{ToplevelRecord, ToplevelState};
use crate::{Result, ShellError};

/// What happens to children whose parent closes without reparenting them
/// first. The protocol does not say whether compositors always send the
/// reparent, so this is configurable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Clear the parent and show the child on its own.
    #[default]
    Detach,
    /// Move the child under the closed parent's own parent, if any.
    Adopt,
}

impl FromStr for OrphanPolicy {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "detach" => Ok(OrphanPolicy::Detach),
            "adopt" => Ok(OrphanPolicy::Adopt),
            other => Err(format!(
                "unknown orphan policy `{other}` (expected detach or adopt)"
            )),
        }
    }
}

/// One foreign-toplevel event, already decoded from the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToplevelEvent<H, O> {
    New(H),
    Title(H, String),
    AppId(H, String),
    State(H, ToplevelState),
    OutputEnter(H, O),
    OutputLeave(H, O),
    Parent(H, Option<H>),
    Done(H),
    Closed(H),
}

/// Live view of every toplevel the compositor announced.
///
/// `H` is the handle identity and `O` the output identity. The registry never
/// owns what they refer to; it only compares and hashes them.
#[derive(Debug)]
pub struct ToplevelRegistry<H, O> {
    records: HashMap<H, ToplevelRecord<H, O>>,
    order: Vec<H>,
    binding: OutputBinding<H, O>,
    orphan_policy: OrphanPolicy,
    next_seq: u64,
}

impl<H, O> ToplevelRegistry<H, O>
where
    H: Clone + Eq + Hash + Debug,
    O: Clone + Eq + Hash + Debug,
{
    pub fn new(output: Option<O>, orphan_policy: OrphanPolicy) -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            binding: OutputBinding::new(output),
            orphan_policy,
            next_seq: 0,
        }
    }

    pub fn dispatch(&mut self, event: ToplevelEvent<H, O>) {
        match event {
            ToplevelEvent::New(handle) => {
                if let Err(err) = self.on_new_handle(handle) {
                    tracing::error!("rejected toplevel registration: {err}");
                }
            }
            ToplevelEvent::Title(handle, title) => self.on_title(&handle, title),
            ToplevelEvent::AppId(handle, app_id) => self.on_app_id(&handle, app_id),
            ToplevelEvent::State(handle, state) => self.on_state(&handle, state),
            ToplevelEvent::OutputEnter(handle, output) => self.on_output_enter(&handle, output),
            ToplevelEvent::OutputLeave(handle, output) => self.on_output_leave(&handle, &output),
            ToplevelEvent::Parent(handle, parent) => self.on_parent_changed(&handle, parent),
            ToplevelEvent::Done(handle) => self.on_done(&handle),
            ToplevelEvent::Closed(handle) => self.on_closed(&handle),
        }
    }

    pub fn on_new_handle(&mut self, handle: H) -> Result<&ToplevelRecord<H, O>> {
        if self.records.contains_key(&handle) {
            return Err(ShellError::DuplicateHandle(format!("{handle:?}")));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push(handle.clone());
        tracing::debug!(?handle, seq, "new toplevel");

        Ok(&*self
            .records
            .entry(handle)
            .or_insert_with(|| ToplevelRecord::new(seq)))
    }

    pub fn on_title(&mut self, handle: &H, title: String) {
        if let Some(record) = self.live_record_mut(handle, "title") {
            record.title = title;
        }
    }

    pub fn on_app_id(&mut self, handle: &H, app_id: String) {
        if let Some(record) = self.live_record_mut(handle, "app_id") {
            record.app_id = app_id;
        }
    }

    pub fn on_state(&mut self, handle: &H, state: ToplevelState) {
        if let Some(record) = self.live_record_mut(handle, "state") {
            record.state = state;
        }
    }

    pub fn on_output_enter(&mut self, handle: &H, output: O) {
        let Some(record) = self.live_record_mut(handle, "output_enter") else {
            return;
        };
        if !record.outputs.insert(output) {
            return;
        }
        self.sync_visual(handle);
    }

    pub fn on_output_leave(&mut self, handle: &H, output: &O) {
        let Some(record) = self.live_record_mut(handle, "output_leave") else {
            return;
        };
        if !record.outputs.remove(output) {
            tracing::trace!(?handle, ?output, "leave for an output never entered");
            return;
        }
        self.sync_visual(handle);
    }

    pub fn on_parent_changed(&mut self, handle: &H, new_parent: Option<H>) {
        let Some(record) = self.records.get(handle) else {
            tracing::warn!(?handle, "dropping parent event for unknown toplevel");
            return;
        };
        let current = record.parent.clone();

        let new_parent = match new_parent {
            Some(parent) if &parent == handle => {
                tracing::warn!(?handle, "toplevel named itself as parent; ignoring");
                return;
            }
            Some(parent) if !self.records.contains_key(&parent) => {
                tracing::warn!(?handle, ?parent, "parent is not a live toplevel; clearing");
                None
            }
            Some(parent) if self.is_ancestor(handle, &parent) => {
                tracing::warn!(?handle, ?parent, "parent would create a cycle; ignoring");
                return;
            }
            other => other,
        };

        if current == new_parent {
            return;
        }

        tracing::debug!(?handle, from = ?current, to = ?new_parent, "toplevel reparented");
        self.reparent(handle, new_parent);
    }

    pub fn on_done(&mut self, handle: &H) {
        if let Some(record) = self.live_record_mut(handle, "done")
            && !record.initialized
        {
            record.initialized = true;
            tracing::trace!(?handle, title = %record.title, "toplevel initialized");
        }
    }

    pub fn on_closed(&mut self, handle: &H) {
        let Some(record) = self.records.remove(handle) else {
            tracing::warn!(?handle, "closed event for unknown toplevel");
            return;
        };

        self.order.retain(|candidate| candidate != handle);
        self.binding.detach(handle);

        if let Some(parent) = &record.parent
            && let Some(parent_record) = self.records.get_mut(parent)
        {
            parent_record.remove_child(handle);
        }

        let orphans: Vec<H> = self
            .order
            .iter()
            .filter(|candidate| {
                self.records
                    .get(*candidate)
                    .is_some_and(|child| child.parent.as_ref() == Some(handle))
            })
            .cloned()
            .collect();

        for orphan in &orphans {
            let adoptive = match self.orphan_policy {
                OrphanPolicy::Detach => None,
                OrphanPolicy::Adopt => record
                    .parent
                    .clone()
                    .filter(|parent| self.records.contains_key(parent)),
            };
            tracing::debug!(?orphan, ?adoptive, "re-homing orphaned toplevel");
            self.reparent(orphan, adoptive);
        }

        tracing::debug!(?handle, title = %record.title, "toplevel closed");
    }

    /// Points the window list at another output (or none) and re-evaluates
    /// every record against it.
    pub fn rebind_output(&mut self, output: Option<O>) {
        if self.binding.output() == output.as_ref() {
            return;
        }

        tracing::info!(?output, "binding window list to output");
        for handle in self.binding.rebind(output) {
            if let Some(record) = self.records.get_mut(&handle) {
                record.visual_attached = false;
            }
        }

        let handles = self.order.clone();
        for handle in &handles {
            self.sync_visual(handle);
        }
    }

    /// Drops an output that no longer exists from every record.
    pub fn forget_output(&mut self, output: &O) {
        if self.binding.is_bound_to(output) {
            self.rebind_output(None);
        }
        for record in self.records.values_mut() {
            record.outputs.remove(output);
        }
    }

    pub fn set_orphan_policy(&mut self, policy: OrphanPolicy) {
        self.orphan_policy = policy;
    }

    pub fn orphan_policy(&self) -> OrphanPolicy {
        self.orphan_policy
    }

    pub fn bound_output(&self) -> Option<&O> {
        self.binding.output()
    }

    pub fn get(&self, handle: &H) -> Option<&ToplevelRecord<H, O>> {
        self.records.get(handle)
    }

    pub fn contains(&self, handle: &H) -> bool {
        self.records.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (&H, &ToplevelRecord<H, O>)> {
        self.order
            .iter()
            .filter_map(|handle| self.records.get(handle).map(|record| (handle, record)))
    }

    /// Attached, parentless records in creation order; what the window list
    /// shows.
    pub fn window_list(&self) -> impl Iterator<Item = (&H, &ToplevelRecord<H, O>)> {
        self.binding
            .iter()
            .filter_map(|handle| self.records.get(handle).map(|record| (handle, record)))
    }

    pub fn window_list_entry(&self, index: usize) -> Option<&H> {
        self.binding.iter().nth(index)
    }

    pub fn drain_changes(&mut self) -> Vec<BindingChange<H>> {
        self.binding.drain_changes()
    }

    fn live_record_mut(
        &mut self,
        handle: &H,
        event: &'static str,
    ) -> Option<&mut ToplevelRecord<H, O>> {
        let record = self.records.get_mut(handle);
        if record.is_none() {
            tracing::warn!(?handle, event, "dropping event for unknown toplevel");
        }
        record
    }

    /// True when `candidate` is `of` or one of its ancestors.
    fn is_ancestor(&self, candidate: &H, of: &H) -> bool {
        let mut current = Some(of);
        let mut steps = 0;
        while let Some(handle) = current {
            if handle == candidate {
                return true;
            }
            steps += 1;
            if steps > self.records.len() {
                // Chain longer than the registry: already cyclic.
                return true;
            }
            current = self
                .records
                .get(handle)
                .and_then(|record| record.parent.as_ref());
        }
        false
    }

    fn reparent(&mut self, handle: &H, new_parent: Option<H>) {
        let Some(record) = self.records.get_mut(handle) else {
            return;
        };
        let old_parent = std::mem::replace(&mut record.parent, new_parent.clone());

        if let Some(old_parent) = old_parent
            && let Some(old_record) = self.records.get_mut(&old_parent)
        {
            old_record.remove_child(handle);
        }

        if let Some(parent) = &new_parent
            && let Some(parent_record) = self.records.get_mut(parent)
        {
            parent_record.add_child(handle.clone());
        }

        self.sync_visual(handle);
    }

    /// Attaches or detaches the record's entry so that exactly the
    /// parentless records on the bound output are shown.
    fn sync_visual(&mut self, handle: &H) {
        let Some(record) = self.records.get_mut(handle) else {
            return;
        };

        let wanted = record.parent.is_none()
            && self
                .binding
                .output()
                .is_some_and(|output| record.outputs.contains(output));

        if wanted {
            self.binding.attach(handle.clone(), record.seq);
        } else {
            self.binding.detach(handle);
        }
        record.visual_attached = wanted;
    }
}
