//! Users and their group memberships.
//!
//! Membership is not an attribute of the user: it is changed through
//! `add_member`/`remove_member` on each group and reported back through the
//! computed `member_of` attribute, which always includes the implicit
//! `users` group.

use super::{Controller, Kind, mark_managed};
use crate::context::Context;
use crate::diff::{self, AttributeSet};
use crate::error::{Error, Result};
use cypress::{ObjectType, YPath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Group every user belongs to without asking.
const IMPLICIT_GROUP: &str = "users";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub member_of: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
struct Wire {
    name: String,
    #[serde(default)]
    member_of: Vec<String>,
}

impl User {
    fn attributes(&self) -> Result<AttributeSet> {
        AttributeSet::builder(self.label())
            .required("name", &self.name)
            .build()
    }
}

impl Controller for User {
    const KIND: Kind = Kind::User;

    fn key(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Read never reports the implicit group, so declaring it could not converge.
    fn validate(&self) -> Result<()> {
        if self.member_of.contains(IMPLICIT_GROUP) {
            return Err(Error::InvalidDeclaration {
                object: self.label(),
                reason: format!(
                    "every user is in '{IMPLICIT_GROUP}' implicitly; drop it from member_of"
                ),
            });
        }
        Ok(())
    }

    fn comparison_attributes(&self) -> Result<AttributeSet> {
        AttributeSet::builder(self.label())
            .required("name", &self.name)
            .required("member_of", &self.member_of)
            .build()
    }

    fn create(&self, ctx: &Context<'_>) -> Result<Self> {
        self.validate()?;
        let mut attributes = self.attributes()?.to_attributes();
        mark_managed(&mut attributes);
        let id = ctx.create_object(ObjectType::User, &attributes)?;
        log::info!("created user {} ({id})", self.name);

        for group in &self.member_of {
            ctx.add_member(group, &self.name)?;
        }
        Ok(Self {
            id: Some(id),
            ..self.clone()
        })
    }

    fn read(ctx: &Context<'_>, id: &str, _prior: Option<&Self>) -> Result<Self> {
        let wire: Wire = ctx.get(&YPath::object(id).attrs())?;
        Ok(Self {
            id: Some(id.to_string()),
            name: wire.name,
            member_of: wire
                .member_of
                .into_iter()
                .filter(|g| g != IMPLICIT_GROUP)
                .collect(),
        })
    }

    fn update(&self, ctx: &Context<'_>, observed: &Self) -> Result<Self> {
        self.validate()?;
        let id = observed.require_id()?;
        let base = YPath::object(id);

        // memberships are keyed by name, so the rename lands first
        diff::diff(&self.attributes()?, Some(&observed.attributes()?)).apply(ctx, &base)?;

        for group in observed.member_of.difference(&self.member_of) {
            ctx.remove_member(group, &self.name)?;
        }
        for group in self.member_of.difference(&observed.member_of) {
            ctx.add_member(group, &self.name)?;
        }

        Self::read(ctx, id, Some(self))
    }

    fn delete(&self, ctx: &Context<'_>) -> Result<()> {
        let path = YPath::users().child(&self.name);
        ctx.remove(&path)?;
        ctx.wait_removed(&path)?;
        log::info!("deleted user {}", self.name);
        Ok(())
    }
}
