use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::helper_functions::read_id_list;
use crate::models::IdentifierType;

/// A plain identifier list to enrich.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneList {
    pub name: String,
    pub path: PathBuf,
    pub identifier_type: IdentifierType,
}

impl GeneList {
    pub fn load(&self) -> Result<Vec<String>> {
        let ids = read_id_list(&self.path)?;
        info!("Read {} {} identifiers for list '{}'", ids.len(), self.identifier_type, self.name);
        Ok(ids)
    }
}
