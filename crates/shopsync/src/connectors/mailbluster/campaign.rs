//! Partner id -> MailBluster campaign id

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed partner -> campaign assignment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct CampaignMapping {
    pub partner: String,
    pub campaign: i64,
}

/// Resolves the campaign of an order from its shop partner id.
///
/// The lookup table wins; otherwise a partner id fully matching the
/// pass-through pattern yields its first capture group as the campaign id.
#[derive(Debug, Clone, Default)]
pub struct PartnerCampaignMapper {
    table: HashMap<String, i64>,
    pass_through: Option<Regex>,
}

impl PartnerCampaignMapper {
    pub fn new(
        mappings: &[CampaignMapping],
        pass_through: Option<&str>,
    ) -> Result<Self, regex::Error> {
        let pass_through = match pass_through.filter(|p| !p.is_empty()) {
            Some(pattern) => Some(Regex::new(&format!("^(?:{})$", pattern))?),
            None => None,
        };
        Ok(Self {
            table: mappings
                .iter()
                .map(|m| (m.partner.clone(), m.campaign))
                .collect(),
            pass_through,
        })
    }

    pub fn campaign_id(&self, partner_id: Option<&str>) -> Option<i64> {
        let partner_id = partner_id?;
        if let Some(campaign) = self.table.get(partner_id) {
            return Some(*campaign);
        }

        self.pass_through
            .as_ref()?
            .captures(partner_id)?
            .get(1)?
            .as_str()
            .parse()
            .ok()
    }
}
