use serde::Deserialize;

use super::range::{check, ensure, Range};
use super::Violation;
use crate::lnrpc::{ChannelAcceptRequest, CommitmentType};

/// Requirements on the parameters of the channel-open request itself.
/// Amounts are in satoshis.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Request {
    pub channel_capacity: Option<Range<u64>>,
    pub channel_reserve: Option<Range<u64>>,
    pub csv_delay: Option<Range<u32>>,
    pub push_amount: Option<Range<u64>>,
    pub max_accepted_htlcs: Option<Range<u32>>,
    pub min_htlc: Option<Range<u64>>,
    pub max_value_in_flight: Option<Range<u64>>,
    pub dust_limit: Option<Range<u64>>,
    pub commitment_types: Option<Vec<CommitmentType>>,
}

impl Request {
    /// Checks the request fields in a fixed order and returns the
    /// first violated constraint.
    pub(crate) fn evaluate(&self, req: &ChannelAcceptRequest) -> Result<(), Violation> {
        ensure(&self.channel_capacity, req.funding_amt, "Channel capacity")?;

        if !check(&self.push_amount, req.push_amt) {
            return Err(Violation::new("Pushed amount lower than expected"));
        }

        ensure(&self.channel_reserve, req.channel_reserve, "Channel reserve")?;
        ensure(&self.csv_delay, req.csv_delay, "Check sequence verify delay")?;
        ensure(
            &self.max_accepted_htlcs,
            req.max_accepted_htlcs,
            "Maximum accepted HTLCs",
        )?;
        ensure(&self.min_htlc, req.min_htlc, "Minimum HTLCs")?;
        ensure(
            &self.max_value_in_flight,
            req.max_value_in_flight,
            "Maximum value in flight",
        )?;
        ensure(
            &self.dust_limit,
            req.dust_limit,
            "Commitment transaction dust limit",
        )?;

        self.check_commitment_type(req.commitment_type)
    }

    fn check_commitment_type(&self, commitment_type: i32) -> Result<(), Violation> {
        let Some(types) = &self.commitment_types else {
            return Ok(());
        };

        if types.iter().any(|t| *t as i32 == commitment_type) {
            return Ok(());
        }

        let names: Vec<String> = types.iter().map(ToString::to_string).collect();
        Err(Violation::new(format!(
            "Commitment type is not in [{}]",
            names.join(", ")
        )))
    }
}
