//! One pre-built decoder element per supported format family.

use anyhow::{Context, Result};

use crate::element::Element;
use crate::extension::ExtensionClass;

/// Index of a decoder inside the [`DecoderRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DecoderSlot(usize);

/// Decoders built once at startup and kept for the life of the pipeline.
pub struct DecoderRegistry {
    slots: Vec<(ExtensionClass, Box<dyn Element>)>,
}

impl DecoderRegistry {
    /// Build a decoder for every class in [`ExtensionClass::SUPPORTED`].
    ///
    /// The first construction failure aborts: a registry with holes would fail
    /// later, mid-playlist, instead of at startup.
    pub fn new<F>(mut factory: F) -> Result<Self>
    where
        F: FnMut(ExtensionClass) -> Result<Box<dyn Element>>,
    {
        let mut slots = Vec::with_capacity(ExtensionClass::SUPPORTED.len());
        for class in ExtensionClass::SUPPORTED {
            let element = factory(class).with_context(|| format!("build {class} decoder"))?;
            tracing::debug!(%class, id = %element.id(), "decoder registered");
            slots.push((class, element));
        }
        Ok(Self { slots })
    }

    /// Slot of the decoder for `class`; `None` for [`ExtensionClass::Unknown`].
    pub fn select(&self, class: ExtensionClass) -> Option<DecoderSlot> {
        self.slots
            .iter()
            .position(|(c, _)| *c == class)
            .map(DecoderSlot)
    }

    pub fn class_of(&self, slot: DecoderSlot) -> ExtensionClass {
        self.slots[slot.0].0
    }

    pub fn element(&self, slot: DecoderSlot) -> &dyn Element {
        self.slots[slot.0].1.as_ref()
    }

    pub fn element_mut(&mut self, slot: DecoderSlot) -> &mut dyn Element {
        self.slots[slot.0].1.as_mut()
    }

    /// Every decoder, linked or not.
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut dyn Element> {
        self.slots.iter_mut().map(|(_, e)| e.as_mut() as &mut dyn Element)
    }
}
