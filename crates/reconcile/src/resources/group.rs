use super::{Controller, Kind, mark_managed};
use crate::context::Context;
use crate::diff::{self, AttributeSet};
use crate::error::Result;
use cypress::{ObjectType, YPath};
use serde::{Deserialize, Serialize};

/// A group of principals. Shares its namespace with users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Wire {
    name: String,
}

impl Controller for Group {
    const KIND: Kind = Kind::Group;

    fn key(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn comparison_attributes(&self) -> Result<AttributeSet> {
        AttributeSet::builder(self.label())
            .required("name", &self.name)
            .build()
    }

    fn create(&self, ctx: &Context<'_>) -> Result<Self> {
        let mut attributes = self.comparison_attributes()?.to_attributes();
        mark_managed(&mut attributes);
        let id = ctx.create_object(ObjectType::Group, &attributes)?;
        log::info!("created group {} ({id})", self.name);
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
        })
    }

    fn update(&self, ctx: &Context<'_>, observed: &Self) -> Result<Self> {
        let id = observed.require_id()?;
        let base = YPath::object(id);
        diff::diff(
            &self.comparison_attributes()?,
            Some(&observed.comparison_attributes()?),
        )
        .apply(ctx, &base)?;
        Self::read(ctx, id, Some(self))
    }

    fn delete(&self, ctx: &Context<'_>) -> Result<()> {
        let path = YPath::groups().child(&self.name);
        ctx.remove(&path)?;
        ctx.wait_removed(&path)?;
        log::info!("deleted group {}", self.name);
        Ok(())
    }
}
