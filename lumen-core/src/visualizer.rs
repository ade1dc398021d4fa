//! Visualizations and their registry
use crate::analyzer;
use crate::controls::ControlAllocator;
use crate::error::{Error, Result};
use crate::frames::FrameContext;
use crate::mapper::SpatialMapper;
use crate::rig::Rig;
use std::collections;

/// A visualization renders one frame at a time into the frame's color buffer
pub trait Visualization {
    fn render(&mut self, ctx: &mut FrameContext<'_>) -> Result<()>;
}

/// Everything a visualization may grab while it is being constructed
#[derive(Debug)]
pub struct Setup<'a> {
    pub rig: &'a Rig,
    pub controls: &'a mut ControlAllocator,
    /// Present if the registry entry asked for one
    pub mapper: Option<SpatialMapper>,
    pub audio: Option<analyzer::SampleBuffer>,
}

impl<'a> Setup<'a> {
    /// Take the spatial mapper bound to this session
    pub fn take_mapper(&mut self) -> Result<SpatialMapper> {
        self.mapper.take().ok_or(Error::NotConfigured)
    }
}

pub type Factory = fn(&mut Setup<'_>) -> Result<Box<dyn Visualization>>;

#[derive(Clone, Copy)]
pub struct Entry {
    /// Bind a [`SpatialMapper`] before calling the factory
    pub needs_mapper: bool,
    pub factory: Factory,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Entry {{ needs_mapper: {:?} }}", self.needs_mapper)
    }
}

/// Known visualizations by name
#[derive(Debug, Default)]
pub struct Registry {
    entries: collections::BTreeMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Registry {
        Default::default()
    }

    pub fn register<S: Into<String>>(
        &mut self,
        name: S,
        needs_mapper: bool,
        factory: Factory,
    ) -> &mut Registry {
        let name = name.into();
        if self
            .entries
            .insert(
                name.clone(),
                Entry {
                    needs_mapper,
                    factory,
                },
            )
            .is_some()
        {
            log::warn!("Visualization {:?} registered twice", name);
        }
        self
    }

    pub fn get(&self, name: &str) -> Result<Entry> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownVisualization(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl Visualization for Nothing {
        fn render(&mut self, _ctx: &mut FrameContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn nothing(_: &mut Setup<'_>) -> Result<Box<dyn Visualization>> {
        Ok(Box::new(Nothing))
    }

    #[test]
    fn test_registry() {
        let mut registry = Registry::new();
        registry
            .register("b", false, nothing)
            .register("a", true, nothing);

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(registry.get("a").unwrap().needs_mapper);
        assert!(matches!(
            registry.get("c"),
            Err(Error::UnknownVisualization(ref n)) if n == "c"
        ));
    }
}
