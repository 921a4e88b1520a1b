//! Feature flags that gate instructions and shape the emitted binary.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A post-MVP proposal an instruction can depend on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Feature {
    SignExtension,
    SaturatingFloatToInt,
    BulkMemory,
    ReferenceTypes,
    Threads,
}

/// Module-wide codec configuration.
///
/// The default corresponds to the WebAssembly 2.0 baseline without threads,
/// writing canonical (minimal) LEB128 integers and keeping custom sections.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Features {
    pub sign_extension: bool,
    pub saturating_float_to_int: bool,
    pub bulk_memory: bool,
    pub reference_types: bool,
    pub threads: bool,
    /// Permit more than one table, counting imported tables.
    pub multi_table: bool,
    /// Permit more than one memory, counting imported memories.
    pub multi_memory: bool,
    pub custom_sections: bool,
    pub name_section: bool,
    /// Pad every LEB128 integer to its maximal width.
    pub max_width_leb: bool,
}

impl Default for Features {
    fn default() -> Self {
        Features {
            sign_extension: true,
            saturating_float_to_int: true,
            bulk_memory: true,
            reference_types: true,
            threads: false,
            multi_table: false,
            multi_memory: false,
            custom_sections: true,
            name_section: true,
            max_width_leb: false,
        }
    }
}

impl Features {
    /// Every proposal and every permissive flag enabled, canonical integers.
    pub fn all() -> Self {
        Features {
            threads: true,
            multi_table: true,
            multi_memory: true,
            ..Features::default()
        }
    }

    /// Only the MVP instruction set.
    pub fn mvp() -> Self {
        Features {
            sign_extension: false,
            saturating_float_to_int: false,
            bulk_memory: false,
            reference_types: false,
            ..Features::default()
        }
    }

    pub fn enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::SignExtension => self.sign_extension,
            Feature::SaturatingFloatToInt => self.saturating_float_to_int,
            Feature::BulkMemory => self.bulk_memory,
            Feature::ReferenceTypes => self.reference_types,
            Feature::Threads => self.threads,
        }
    }

    pub fn with_threads(mut self, on: bool) -> Self {
        self.threads = on;
        self
    }

    pub fn with_multi_table(mut self, on: bool) -> Self {
        self.multi_table = on;
        self
    }

    pub fn with_multi_memory(mut self, on: bool) -> Self {
        self.multi_memory = on;
        self
    }

    pub fn with_custom_sections(mut self, on: bool) -> Self {
        self.custom_sections = on;
        self
    }

    pub fn with_name_section(mut self, on: bool) -> Self {
        self.name_section = on;
        self
    }

    pub fn with_max_width_leb(mut self, on: bool) -> Self {
        self.max_width_leb = on;
        self
    }
}
