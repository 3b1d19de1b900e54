//! High-level calculation calls against the Builder.
//!
//! [`BuilderClient`] wraps a single [`ProtocolSession`], so it inherits the
//! single-flight rule: one calculation at a time per client. Create more
//! clients to run calculations in parallel.

use std::sync::Arc;

use wise_core::EndpointRegistry;

use crate::calculation::{CalculationCodec, JobDefaults, JobDefaultsQuery};
use crate::protocol::{
    CompletionPolicy, SessionRequest, OP_FIRE_BEHAVIOUR, OP_FIRE_WEATHER_INDEX, OP_FORECAST,
    OP_JOB_DEFAULTS, OP_SOLAR,
};
use crate::session::{ProtocolSession, SessionError};

/// Calculation facade over one reusable session.
#[derive(Clone)]
pub struct BuilderClient {
    session: ProtocolSession,
}

impl BuilderClient {
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self::with_session(ProtocolSession::new(registry))
    }

    pub fn with_session(session: ProtocolSession) -> Self {
        Self { session }
    }

    /// The underlying session, for raw requests.
    pub fn session(&self) -> &ProtocolSession {
        &self.session
    }

    /// Fire behaviour prediction.
    pub async fn fire_behaviour<C: CalculationCodec>(
        &self,
        codec: &C,
    ) -> Result<Option<C::Output>, SessionError> {
        self.calculate(OP_FIRE_BEHAVIOUR, CompletionPolicy::SinglePacket, codec)
            .await
    }

    /// Fire weather index codes.
    pub async fn fire_weather_index<C: CalculationCodec>(
        &self,
        codec: &C,
    ) -> Result<Option<C::Output>, SessionError> {
        self.calculate(OP_FIRE_WEATHER_INDEX, CompletionPolicy::SinglePacket, codec)
            .await
    }

    /// Solar times.
    pub async fn solar<C: CalculationCodec>(
        &self,
        codec: &C,
    ) -> Result<Option<C::Output>, SessionError> {
        self.calculate(OP_SOLAR, CompletionPolicy::SinglePacket, codec)
            .await
    }

    /// Hourly forecast stream; the Builder sends one record per hour.
    pub async fn forecast<C: CalculationCodec>(
        &self,
        codec: &C,
    ) -> Result<Option<C::Output>, SessionError> {
        self.calculate(OP_FORECAST, CompletionPolicy::MarkerTerminated, codec)
            .await
    }

    /// Default settings the Builder applies to new jobs.
    pub async fn job_defaults(&self) -> Result<Option<JobDefaults>, SessionError> {
        self.calculate(
            OP_JOB_DEFAULTS,
            CompletionPolicy::MarkerTerminated,
            &JobDefaultsQuery,
        )
        .await
    }

    /// Run any operation through `codec`.
    ///
    /// `Ok(None)` means the Builder answered with an unexpected shape.
    pub async fn calculate<C: CalculationCodec>(
        &self,
        operation: &str,
        completion: CompletionPolicy,
        codec: &C,
    ) -> Result<Option<C::Output>, SessionError> {
        let mut request = SessionRequest::new(operation, completion);
        request.parameter_lines = codec.parameter_lines();

        let response = self.session.execute(request).await?;
        let decoded = codec.decode(&response);
        if decoded.is_none() {
            tracing::warn!(
                operation,
                fields = response.fields().len(),
                "Unexpected Builder response shape, result not calculated",
            );
        }
        Ok(decoded)
    }
}
