//! Organizational scopes: tenant → subsidiary (arbitrary depth) → talent.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{SubsidiaryId, TalentId};

/// The type tag of a scope.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Tenant,
    Subsidiary,
    Talent,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Tenant => "tenant",
            ScopeKind::Subsidiary => "subsidiary",
            ScopeKind::Talent => "talent",
        }
    }
}

impl core::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tenant" => Ok(ScopeKind::Tenant),
            "subsidiary" => Ok(ScopeKind::Subsidiary),
            "talent" => Ok(ScopeKind::Talent),
            other => Err(DomainError::invalid_scope(format!("unknown scope type '{other}'"))),
        }
    }
}

/// A scope at which a role can be assigned.
///
/// `Tenant` is the unique root and carries no id.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Tenant,
    Subsidiary(SubsidiaryId),
    Talent(TalentId),
}

impl Scope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Tenant => ScopeKind::Tenant,
            Scope::Subsidiary(_) => ScopeKind::Subsidiary,
            Scope::Talent(_) => ScopeKind::Talent,
        }
    }

    pub fn is_tenant(&self) -> bool {
        matches!(self, Scope::Tenant)
    }

    /// The id segment, `None` for the tenant root.
    pub fn id_string(&self) -> Option<String> {
        match self {
            Scope::Tenant => None,
            Scope::Subsidiary(id) => Some(id.to_string()),
            Scope::Talent(id) => Some(id.to_string()),
        }
    }

    /// Build a scope from its wire parts (`scopeType`, `scopeId`).
    ///
    /// A missing type defaults to the tenant root. Tenant scope must not carry an
    /// id; subsidiary and talent scopes must.
    pub fn from_parts(kind: Option<&str>, id: Option<&str>) -> Result<Self, DomainError> {
        let kind = match kind {
            Some(k) => k.parse::<ScopeKind>()?,
            None => ScopeKind::Tenant,
        };

        match (kind, id) {
            (ScopeKind::Tenant, None) => Ok(Scope::Tenant),
            (ScopeKind::Tenant, Some(_)) => {
                Err(DomainError::invalid_scope("tenant scope does not take an id"))
            }
            (ScopeKind::Subsidiary, Some(id)) => Ok(Scope::Subsidiary(id.parse()?)),
            (ScopeKind::Talent, Some(id)) => Ok(Scope::Talent(id.parse()?)),
            (kind, None) => Err(DomainError::invalid_scope(format!("{kind} scope requires an id"))),
        }
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Scope::Tenant => f.write_str("tenant"),
            Scope::Subsidiary(id) => write!(f, "subsidiary:{id}"),
            Scope::Talent(id) => write!(f, "talent:{id}"),
        }
    }
}

impl From<SubsidiaryId> for Scope {
    fn from(value: SubsidiaryId) -> Self {
        Scope::Subsidiary(value)
    }
}

impl From<TalentId> for Scope {
    fn from(value: TalentId) -> Self {
        Scope::Talent(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_type_defaults_to_tenant() {
        assert_eq!(Scope::from_parts(None, None).unwrap(), Scope::Tenant);
    }

    #[test]
    fn tenant_with_id_is_rejected() {
        let id = SubsidiaryId::new().to_string();
        assert!(Scope::from_parts(Some("tenant"), Some(&id)).is_err());
    }

    #[test]
    fn talent_without_id_is_rejected() {
        let err = Scope::from_parts(Some("talent"), None).unwrap_err();
        assert!(err.to_string().contains("requires an id"));
    }

    #[test]
    fn parts_parse_into_typed_scope() {
        let id = SubsidiaryId::new();
        let scope = Scope::from_parts(Some("subsidiary"), Some(&id.to_string())).unwrap();
        assert_eq!(scope, Scope::Subsidiary(id));
        assert_eq!(scope.to_string(), format!("subsidiary:{id}"));
    }

    #[test]
    fn tenant_serializes_without_id() {
        let json = serde_json::to_string(&Scope::Tenant).unwrap();
        assert_eq!(json, r#"{"type":"tenant"}"#);

        let talent = TalentId::new();
        let json = serde_json::to_value(Scope::Talent(talent)).unwrap();
        assert_eq!(json["type"], "talent");
        assert_eq!(json["id"], talent.to_string());
    }
}
