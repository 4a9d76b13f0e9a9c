pub mod health;
pub mod metrics;
pub mod orders;
pub mod promotions;
pub mod trades;

use common::AggregateId;
use domain::ProposalId;

use crate::error::ApiError;

pub(crate) fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}

pub(crate) fn parse_proposal_id(id: &str) -> Result<ProposalId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid proposal ID: {e}")))
}
