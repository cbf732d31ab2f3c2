use std::fmt::Debug;
use std::hash::Hash;

use crate::config::WindowListConfig;
use crate::toplevel::{ToplevelCommand, ToplevelRegistry};

/// User interaction with a window-list entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Click,
    MiddleClick,
    ToggleMinimize,
    ToggleMaximize,
    Close,
}

impl Action {
    /// Works out which request, if any, the interaction should send for
    /// `handle`.
    pub fn resolve<H, O>(
        self,
        registry: &ToplevelRegistry<H, O>,
        handle: &H,
        config: &WindowListConfig,
    ) -> Option<ToplevelCommand>
    where
        H: Clone + Eq + Hash + Debug,
        O: Clone + Eq + Hash + Debug,
    {
        let record = registry.get(handle)?;

        match self {
            Action::Click => {
                let child_activated = record
                    .children()
                    .iter()
                    .filter_map(|child| registry.get(child))
                    .any(|child| child.is_activated());

                if !record.is_activated() && !child_activated {
                    Some(ToplevelCommand::Activate)
                } else {
                    Some(ToplevelCommand::SetMinimized(!record.is_minimized()))
                }
            }
            Action::MiddleClick => config
                .middle_click_close
                .then_some(ToplevelCommand::Close),
            Action::ToggleMinimize => Some(ToplevelCommand::SetMinimized(!record.is_minimized())),
            Action::ToggleMaximize => Some(ToplevelCommand::SetMaximized(!record.is_maximized())),
            Action::Close => Some(ToplevelCommand::Close),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toplevel::{OrphanPolicy, ToplevelState};

    fn registry() -> ToplevelRegistry<u32, u32> {
        let mut registry = ToplevelRegistry::new(Some(0), OrphanPolicy::Detach);
        registry.on_new_handle(1).unwrap();
        registry.on_new_handle(2).unwrap();
        registry.on_parent_changed(&2, Some(1));
        registry
    }

    #[test]
    fn click_activates_inactive_window() {
        let registry = registry();
        let config = WindowListConfig::default();
        assert_eq!(
            Action::Click.resolve(&registry, &1, &config),
            Some(ToplevelCommand::Activate)
        );
    }

    #[test]
    fn click_minimizes_active_window() {
        let mut registry = registry();
        registry.on_state(&1, ToplevelState::ACTIVATED);
        let config = WindowListConfig::default();
        assert_eq!(
            Action::Click.resolve(&registry, &1, &config),
            Some(ToplevelCommand::SetMinimized(true))
        );
    }

    #[test]
    fn click_with_active_child_toggles_minimize() {
        let mut registry = registry();
        registry.on_state(&2, ToplevelState::ACTIVATED);
        registry.on_state(&1, ToplevelState::MINIMIZED);
        let config = WindowListConfig::default();
        assert_eq!(
            Action::Click.resolve(&registry, &1, &config),
            Some(ToplevelCommand::SetMinimized(false))
        );
    }

    #[test]
    fn middle_click_closes_only_when_enabled() {
        let registry = registry();
        let mut config = WindowListConfig::default();
        assert_eq!(Action::MiddleClick.resolve(&registry, &1, &config), None);

        config.middle_click_close = true;
        assert_eq!(
            Action::MiddleClick.resolve(&registry, &1, &config),
            Some(ToplevelCommand::Close)
        );
    }

    #[test]
    fn menu_toggles_follow_state() {
        let mut registry = registry();
        registry.on_state(&1, ToplevelState::MAXIMIZED);
        let config = WindowListConfig::default();
        assert_eq!(
            Action::ToggleMaximize.resolve(&registry, &1, &config),
            Some(ToplevelCommand::SetMaximized(false))
        );
        assert_eq!(
            Action::ToggleMinimize.resolve(&registry, &1, &config),
            Some(ToplevelCommand::SetMinimized(true))
        );
        assert_eq!(Action::Close.resolve(&registry, &9, &config), None);
    }
}
