use serde::{Deserialize, Serialize};

use agrochain_core::{Entity, FarmerId};

/// A producer from the external farmer directory. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Farmer {
    pub id: FarmerId,
    pub name: String,
}

impl Farmer {
    pub fn new(id: FarmerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl Entity for Farmer {
    type Id = FarmerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
