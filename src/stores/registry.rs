//! Artifact type registry.
//!
//! Maps two-letter uppercase prefixes to type definitions: category (text
//! vs binary), allowed subtypes, declared type-specific fields, binary
//! formats, and the default template for text types. Ten built-in types
//! ship with the crate; their prefixes are reserved and cannot be
//! re-registered. Callers may register additional types on their own
//! registry instance; stores default to a process-wide shared instance.

use crate::core::error::OapsError;
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One validation finding against a record.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    pub record_id: Option<String>,
    pub field: Option<String>,
}

impl ValidationIssue {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            record_id: None,
            field: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            record_id: None,
            field: None,
        }
    }

    pub fn for_record(mut self, record_id: &str) -> Self {
        self.record_id = Some(record_id.to_string());
        self
    }

    pub fn for_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

/// Storage category of an artifact type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// Markdown file with front-matter
    Text,
    /// Opaque content file plus a YAML sidecar
    Binary,
}

/// Semantic type of a declared type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    List,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_bool(),
            FieldKind::List => value.is_sequence(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::List => "list",
        }
    }
}

/// A type-specific metadata field declared by a type definition.
#[derive(Debug, Clone)]
pub struct TypeField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub required: bool,
    pub allowed_values: Option<&'static [&'static str]>,
}

impl TypeField {
    const fn new(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
            allowed_values: None,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn allowed(mut self, values: &'static [&'static str]) -> Self {
        self.allowed_values = Some(values);
        self
    }
}

/// Definition of one artifact type.
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    pub prefix: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: TypeCategory,
    pub subtypes: &'static [&'static str],
    pub type_fields: &'static [TypeField],
    /// Permitted file extensions for binary types; the first is the default.
    pub formats: &'static [&'static str],
    /// Default template name for text types.
    pub template: Option<&'static str>,
}

const REVIEW_FIELDS: &[TypeField] = &[TypeField::new(
    "review_type",
    FieldKind::String,
    "Kind of review performed",
)
.required()
.allowed(&["design", "security", "code", "architecture"])];

const DECISION_FIELDS: &[TypeField] = &[TypeField::new(
    "impact",
    FieldKind::String,
    "Blast radius of the decision",
)
.allowed(&["low", "medium", "high"])];

const CHANGE_FIELDS: &[TypeField] = &[TypeField::new(
    "change_kind",
    FieldKind::String,
    "Nature of the change",
)];

const DIAGRAM_FIELDS: &[TypeField] = &[TypeField::new(
    "notation",
    FieldKind::String,
    "Diagram notation used",
)];

const EXAMPLE_FIELDS: &[TypeField] = &[TypeField::new(
    "language",
    FieldKind::String,
    "Language of the example code",
)];

const TRANSCRIPT_FIELDS: &[TypeField] = &[TypeField::new(
    "participants",
    FieldKind::List,
    "Participants in the conversation",
)];

const IMAGE_FIELDS: &[TypeField] = &[TypeField::new(
    "alt_text",
    FieldKind::String,
    "Accessible description of the image",
)
.required()];

const ATTACHMENT_FIELDS: &[TypeField] = &[TypeField::new(
    "media_type",
    FieldKind::String,
    "MIME type of the attached file",
)];

/// The ten built-in artifact types.
pub const BASE_TYPES: &[TypeDefinition] = &[
    TypeDefinition {
        prefix: "RV",
        name: "review",
        description: "Formal examination of a design, change, or system",
        category: TypeCategory::Text,
        subtypes: &["design", "security", "code", "architecture"],
        type_fields: REVIEW_FIELDS,
        formats: &[],
        template: Some("review.md"),
    },
    TypeDefinition {
        prefix: "DC",
        name: "decision",
        description: "Recorded decision with context and consequences",
        category: TypeCategory::Text,
        subtypes: &[],
        type_fields: DECISION_FIELDS,
        formats: &[],
        template: Some("decision.md"),
    },
    TypeDefinition {
        prefix: "CH",
        name: "change",
        description: "Description of an implemented or planned change",
        category: TypeCategory::Text,
        subtypes: &[],
        type_fields: CHANGE_FIELDS,
        formats: &[],
        template: Some("change.md"),
    },
    TypeDefinition {
        prefix: "AN",
        name: "analysis",
        description: "Investigation or study of a problem space",
        category: TypeCategory::Text,
        subtypes: &[],
        type_fields: &[],
        formats: &[],
        template: Some("analysis.md"),
    },
    TypeDefinition {
        prefix: "DG",
        name: "diagram",
        description: "Diagram source (flowchart, sequence, ER)",
        category: TypeCategory::Text,
        subtypes: &["flowchart", "sequence", "er"],
        type_fields: DIAGRAM_FIELDS,
        formats: &[],
        template: Some("diagram.md"),
    },
    TypeDefinition {
        prefix: "EX",
        name: "example",
        description: "Worked example or reference usage",
        category: TypeCategory::Text,
        subtypes: &[],
        type_fields: EXAMPLE_FIELDS,
        formats: &[],
        template: Some("example.md"),
    },
    TypeDefinition {
        prefix: "NT",
        name: "note",
        description: "Free-form working note",
        category: TypeCategory::Text,
        subtypes: &[],
        type_fields: &[],
        formats: &[],
        template: Some("note.md"),
    },
    TypeDefinition {
        prefix: "TR",
        name: "transcript",
        description: "Conversation or meeting transcript",
        category: TypeCategory::Text,
        subtypes: &[],
        type_fields: TRANSCRIPT_FIELDS,
        formats: &[],
        template: Some("transcript.md"),
    },
    TypeDefinition {
        prefix: "IM",
        name: "image",
        description: "Visual reference",
        category: TypeCategory::Binary,
        subtypes: &[],
        type_fields: IMAGE_FIELDS,
        formats: &["png", "jpg", "webp"],
        template: None,
    },
    TypeDefinition {
        prefix: "AT",
        name: "attachment",
        description: "Opaque supporting document",
        category: TypeCategory::Binary,
        subtypes: &[],
        type_fields: ATTACHMENT_FIELDS,
        formats: &["pdf", "zip", "bin"],
        template: None,
    },
];

/// Prefixes of the built-in types; may not be re-registered.
pub fn reserved_prefixes() -> &'static [&'static str] {
    static PREFIXES: OnceLock<Vec<&'static str>> = OnceLock::new();
    PREFIXES.get_or_init(|| BASE_TYPES.iter().map(|t| t.prefix).collect())
}

/// Registry of artifact type definitions, indexed by prefix and by name.
#[derive(Debug, Clone)]
pub struct ArtifactRegistry {
    by_prefix: HashMap<String, TypeDefinition>,
    by_name: HashMap<String, TypeDefinition>,
}

impl Default for ArtifactRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactRegistry {
    /// Create a registry populated with the built-in types.
    pub fn new() -> Self {
        let mut registry = Self {
            by_prefix: HashMap::new(),
            by_name: HashMap::new(),
        };
        for def in BASE_TYPES {
            registry.insert(def.clone());
        }
        registry
    }

    /// The process-wide shared registry.
    pub fn shared() -> &'static ArtifactRegistry {
        static SHARED: OnceLock<ArtifactRegistry> = OnceLock::new();
        SHARED.get_or_init(ArtifactRegistry::new)
    }

    fn insert(&mut self, def: TypeDefinition) {
        self.by_name.insert(def.name.to_string(), def.clone());
        self.by_prefix.insert(def.prefix.to_string(), def);
    }

    /// Register an additional type. Reserved prefixes cannot be overridden.
    pub fn register(&mut self, def: TypeDefinition) -> Result<(), OapsError> {
        if def.prefix.len() != 2 || !def.prefix.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(OapsError::Validation(format!(
                "type prefix must be two uppercase letters, got {:?}",
                def.prefix
            )));
        }
        if reserved_prefixes().contains(&def.prefix) {
            return Err(OapsError::Validation(format!(
                "prefix {:?} is reserved and cannot be re-registered",
                def.prefix
            )));
        }
        if self.by_prefix.contains_key(def.prefix) {
            return Err(OapsError::Duplicate(format!(
                "type prefix {:?} already registered",
                def.prefix
            )));
        }
        self.insert(def);
        Ok(())
    }

    pub fn get_by_prefix(&self, prefix: &str) -> Option<&TypeDefinition> {
        self.by_prefix.get(prefix)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&TypeDefinition> {
        self.by_name.get(name)
    }

    /// Look up a type by prefix or by name.
    pub fn get(&self, key: &str) -> Option<&TypeDefinition> {
        self.get_by_prefix(key).or_else(|| self.get_by_name(key))
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.by_prefix.values()
    }

    /// Validate declared type fields and subtype against a definition.
    ///
    /// Checks required fields are present, values match their declared kind,
    /// and `allowed_values` membership holds. Unknown keys are permitted.
    pub fn validate_fields(
        &self,
        def: &TypeDefinition,
        subtype: Option<&str>,
        type_fields: &BTreeMap<String, Value>,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if let Some(subtype) = subtype
            && !def.subtypes.is_empty()
            && !def.subtypes.contains(&subtype)
        {
            issues.push(
                ValidationIssue::error(format!(
                    "subtype {:?} not allowed for type {:?} (allowed: {})",
                    subtype,
                    def.name,
                    def.subtypes.join(", ")
                ))
                .for_field("subtype"),
            );
        }

        for field in def.type_fields {
            let value = type_fields.get(field.name);
            match value {
                None => {
                    if field.required {
                        issues.push(
                            ValidationIssue::error(format!(
                                "missing required field {:?}",
                                field.name
                            ))
                            .for_field(field.name),
                        );
                    }
                }
                Some(value) => {
                    if !field.kind.matches(value) {
                        issues.push(
                            ValidationIssue::error(format!(
                                "field {:?} must be a {}",
                                field.name,
                                field.kind.name()
                            ))
                            .for_field(field.name),
                        );
                        continue;
                    }
                    if let (Some(allowed), Some(actual)) =
                        (field.allowed_values, value.as_str())
                        && !allowed.contains(&actual)
                    {
                        issues.push(
                            ValidationIssue::error(format!(
                                "field {:?} value {:?} not in allowed set ({})",
                                field.name,
                                actual,
                                allowed.join(", ")
                            ))
                            .for_field(field.name),
                        );
                    }
                }
            }
        }

        issues
    }
}
