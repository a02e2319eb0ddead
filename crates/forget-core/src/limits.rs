//! Input validation limits for configuration and traversal resource protection

/// Maximum length for entity type names (64 chars)
pub const MAX_TYPE_NAME_LEN: usize = 64;

/// Maximum length for field names (128 chars)
pub const MAX_FIELD_NAME_LEN: usize = 128;

/// Default maximum number of entities visited by one traversal (10000)
pub const DEFAULT_MAX_TRAVERSAL_NODES: usize = 10_000;

/// Hard ceiling for a configured traversal node limit (1000000)
pub const MAX_TRAVERSAL_NODES: usize = 1_000_000;

/// Validation error type
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyTypeName,
    TypeNameTooLong { len: usize, max: usize },
    EmptyFieldName,
    FieldNameTooLong { len: usize, max: usize },
    TraversalNodesOutOfRange { nodes: usize, max: usize },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTypeName => write!(f, "Entity type name cannot be empty"),
            Self::TypeNameTooLong { len, max } => {
                write!(f, "Entity type name too long: {} chars (max {})", len, max)
            }
            Self::EmptyFieldName => write!(f, "Field name cannot be empty"),
            Self::FieldNameTooLong { len, max } => {
                write!(f, "Field name too long: {} chars (max {})", len, max)
            }
            Self::TraversalNodesOutOfRange { nodes, max } => {
                write!(f, "Traversal node limit out of range: {} (1..={})", nodes, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate entity type name
pub fn validate_type_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyTypeName);
    }
    if name.len() > MAX_TYPE_NAME_LEN {
        return Err(ValidationError::TypeNameTooLong {
            len: name.len(),
            max: MAX_TYPE_NAME_LEN,
        });
    }
    Ok(())
}

/// Validate field name
pub fn validate_field_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyFieldName);
    }
    if name.len() > MAX_FIELD_NAME_LEN {
        return Err(ValidationError::FieldNameTooLong {
            len: name.len(),
            max: MAX_FIELD_NAME_LEN,
        });
    }
    Ok(())
}

/// Validate a traversal node limit
pub fn validate_max_nodes(nodes: usize) -> Result<(), ValidationError> {
    if nodes == 0 || nodes > MAX_TRAVERSAL_NODES {
        return Err(ValidationError::TraversalNodesOutOfRange {
            nodes,
            max: MAX_TRAVERSAL_NODES,
        });
    }
    Ok(())
}

/// Resource limits applied to a single traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits {
    /// Maximum number of distinct entities visited
    pub max_nodes: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_TRAVERSAL_NODES,
        }
    }
}

impl TraversalLimits {
    pub fn with_max_nodes(max_nodes: usize) -> Result<Self, ValidationError> {
        validate_max_nodes(max_nodes)?;
        Ok(Self { max_nodes })
    }
}
