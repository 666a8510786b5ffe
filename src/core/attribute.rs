//! Typed target attributes.
//!
//! Each attribute kind may appear at most once on a target. Setting an
//! attribute of a kind that is already present replaces it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What a target produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetType {
    /// Executable binary
    #[default]
    #[serde(alias = "exe", alias = "bin")]
    Executable,

    /// Static library (.a)
    #[serde(alias = "lib")]
    Static,

    /// Shared library (.so / .dylib)
    #[serde(alias = "shared")]
    Dynamic,

    /// Headers only; nothing is compiled or linked
    #[serde(alias = "interface")]
    HeaderOnly,

    /// Object files consumed directly by dependents
    Objects,
}

impl TargetType {
    /// Get the typical file extension for this target type.
    pub fn extension(&self, os: &str) -> &'static str {
        match self {
            TargetType::Executable => {
                if os == "windows" {
                    "exe"
                } else {
                    ""
                }
            }
            TargetType::Static => "a",
            TargetType::Dynamic => match os {
                "macos" => "dylib",
                "windows" => "dll",
                _ => "so",
            },
            TargetType::HeaderOnly | TargetType::Objects => "",
        }
    }

    /// Get the typical file prefix for this target type.
    pub fn prefix(&self) -> &'static str {
        match self {
            TargetType::Static | TargetType::Dynamic => "lib",
            _ => "",
        }
    }

    /// Get the output filename for a target of this type.
    pub fn output_filename(&self, name: &str, os: &str) -> String {
        let ext = self.extension(os);
        if ext.is_empty() {
            format!("{}{}", self.prefix(), name)
        } else {
            format!("{}{}.{}", self.prefix(), name, ext)
        }
    }

    /// Whether the linker or archiver produces an artifact for this type.
    pub fn produces_binary(&self) -> bool {
        matches!(
            self,
            TargetType::Executable | TargetType::Static | TargetType::Dynamic
        )
    }

    /// Whether dependents link against this target's output.
    pub fn is_linkable(&self) -> bool {
        matches!(self, TargetType::Static | TargetType::Dynamic)
    }
}

/// Settings for the metadata code generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodegenMeta {
    /// Root that header paths are reported relative to.
    pub root: PathBuf,
}

/// Which precompiled header a target builds or includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PchMode {
    /// Built by one target and included by itself and its dependents.
    Shared,
    /// Built and included by a single target.
    Private,
}

impl PchMode {
    /// File name of the generated umbrella header.
    pub fn header_name(&self) -> &'static str {
        match self {
            PchMode::Shared => "SharedPCH.h",
            PchMode::Private => "PrivatePCH.h",
        }
    }
}

/// Headers to precompile into one umbrella header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePch {
    pub mode: PchMode,
    pub headers: Vec<PathBuf>,
}

/// Precompiled header included by every C++ source of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsePch {
    pub mode: PchMode,
    /// Target that creates a shared header; `None` means the target itself.
    pub provider: Option<String>,
}

/// Discriminant of [`Attribute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKind {
    TargetType,
    CodegenMeta,
    CreatePch,
    UsePch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    TargetType(TargetType),
    CodegenMeta(CodegenMeta),
    CreatePch(CreatePch),
    UsePch(UsePch),
}

impl Attribute {
    pub fn kind(&self) -> AttributeKind {
        match self {
            Attribute::TargetType(_) => AttributeKind::TargetType,
            Attribute::CodegenMeta(_) => AttributeKind::CodegenMeta,
            Attribute::CreatePch(_) => AttributeKind::CreatePch,
            Attribute::UsePch(_) => AttributeKind::UsePch,
        }
    }
}

/// At most one attribute per kind.
#[derive(Debug, Clone, Default)]
pub struct AttributeSet {
    attributes: BTreeMap<AttributeKind, Attribute>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `attribute`, returning the one it replaced.
    pub fn set(&mut self, attribute: Attribute) -> Option<Attribute> {
        self.attributes.insert(attribute.kind(), attribute)
    }

    pub fn get(&self, kind: AttributeKind) -> Option<&Attribute> {
        self.attributes.get(&kind)
    }

    pub fn remove(&mut self, kind: AttributeKind) -> Option<Attribute> {
        self.attributes.remove(&kind)
    }

    pub fn contains(&self, kind: AttributeKind) -> bool {
        self.attributes.contains_key(&kind)
    }

    pub fn target_type(&self) -> Option<TargetType> {
        match self.get(AttributeKind::TargetType) {
            Some(Attribute::TargetType(ty)) => Some(*ty),
            _ => None,
        }
    }

    pub fn codegen_meta(&self) -> Option<&CodegenMeta> {
        match self.get(AttributeKind::CodegenMeta) {
            Some(Attribute::CodegenMeta(meta)) => Some(meta),
            _ => None,
        }
    }

    pub fn create_pch(&self) -> Option<&CreatePch> {
        match self.get(AttributeKind::CreatePch) {
            Some(Attribute::CreatePch(pch)) => Some(pch),
            _ => None,
        }
    }

    pub fn use_pch(&self) -> Option<&UsePch> {
        match self.get(AttributeKind::UsePch) {
            Some(Attribute::UsePch(pch)) => Some(pch),
            _ => None,
        }
    }
}
