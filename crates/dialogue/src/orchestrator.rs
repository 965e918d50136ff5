//! Turn orchestration.
//!
//! One instance serves every call. Each turn takes the session's turn
//! gate, inspects the phase, and produces exactly one spoken response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use homeserv_core::{ApplianceCategory, CallPhase, FallbackCategory, SpokenResponse};
use homeserv_diagnostics as diagnostics;
use homeserv_scheduling::{
    BookingRequest, DayPart, SchedulingEngine, SchedulingError, SlotOffer, SlotQuery,
};
use homeserv_session::{CallSession, SessionError, SessionManager};

use crate::collaborators::{EmailCollaborator, ImageAnalysis, ImageCollaborator, UploadToken};
use crate::tools::ToolCall;
use crate::{utterances, DialogueError};

/// Session fact keys.
const FACT_APPLIANCE: &str = "appliance";
const FACT_SYMPTOM: &str = "symptom";
const FACT_ZIP: &str = "zip";
const FACT_OFFERED_SLOTS: &str = "offered_slots";
const FACT_SELECTED_SLOT: &str = "selected_slot";
const FACT_UPLOAD_TOKEN: &str = "upload_token";
const FACT_IMAGE_SUMMARY: &str = "image_summary";
const FACT_STEPS_TRIED: &str = "steps_tried";

const COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(10);

/// One caller turn: either a raw transcript or a structured tool call
/// from the voice layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnIntent {
    Transcript {
        text: String,
    },
    ToolCall {
        name: String,
        #[serde(default)]
        arguments: Value,
    },
}

/// Drives the conversation for every live call.
pub struct DialogueOrchestrator {
    sessions: Arc<SessionManager>,
    engine: SchedulingEngine,
    email: Arc<dyn EmailCollaborator>,
    images: Arc<dyn ImageCollaborator>,
}

impl DialogueOrchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        engine: SchedulingEngine,
        email: Arc<dyn EmailCollaborator>,
        images: Arc<dyn ImageCollaborator>,
    ) -> Self {
        Self {
            sessions,
            engine,
            email,
            images,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Open the session for a new call and greet the caller.
    pub async fn begin_call(
        &self,
        call_id: &str,
        caller_phone: &str,
    ) -> Result<SpokenResponse, DialogueError> {
        let session = self.sessions.open(call_id, caller_phone)?;
        let _turn = session.begin_turn().await;
        self.ensure_customer(&session)?;
        session.transition_to(CallPhase::Identify)?;
        Ok(SpokenResponse::say(utterances::GREETING))
    }

    /// Handle one turn. Turns for the same call are serialized by the
    /// session's turn gate.
    pub async fn handle_turn(
        &self,
        call_id: &str,
        intent: TurnIntent,
    ) -> Result<SpokenResponse, DialogueError> {
        let session = self.sessions.get(call_id)?;
        let _turn = session.begin_turn().await;
        if session.is_closed() {
            return Err(SessionError::SessionClosed(session.id.clone()).into());
        }
        session.touch();
        self.poll_image_analysis(&session).await;
        let result = match intent {
            TurnIntent::Transcript { text } => self.handle_transcript(&session, &text),
            TurnIntent::ToolCall { name, arguments } => {
                self.handle_tool(&session, &name, &arguments).await
            }
        };
        match result {
            // A dead scheduling store is the one unrecoverable fault: the
            // call ends with an apology instead of a retry loop.
            Err(DialogueError::Scheduling(SchedulingError::Storage(message))) => {
                tracing::error!(call_id = %session.id, %message, "storage failure, ending call");
                session.close();
                Ok(SpokenResponse::fallback(
                    utterances::APOLOGIZE_AND_END,
                    FallbackCategory::ApologizeAndEnd,
                ))
            }
            other => other,
        }
    }

    /// Fold a finished image analysis into the session facts. Pending
    /// analyses and collaborator hiccups are ignored and retried on the
    /// next turn.
    async fn poll_image_analysis(&self, session: &CallSession) {
        let Some(token) = session.fact(FACT_UPLOAD_TOKEN) else {
            return;
        };
        if session.fact(FACT_IMAGE_SUMMARY).is_some() {
            return;
        }
        match tokio::time::timeout(COLLABORATOR_TIMEOUT, self.images.analysis(&token)).await {
            Ok(Ok(ImageAnalysis::Ready { summary })) => {
                info!(call_id = %session.id, "image analysis ready");
                session.set_fact(FACT_IMAGE_SUMMARY, summary);
                session.clear_fact(FACT_UPLOAD_TOKEN);
            }
            Ok(Ok(ImageAnalysis::Expired)) => {
                session.clear_fact(FACT_UPLOAD_TOKEN);
            }
            Ok(Ok(ImageAnalysis::Pending)) => {}
            Ok(Err(e)) => {
                warn!(call_id = %session.id, error = %e, "image analysis failed");
            }
            Err(_) => {
                warn!(call_id = %session.id, "image analysis timed out");
            }
        }
    }

    /// Hang-up signal. Safe to call for unknown or already-ended calls.
    pub async fn end_call(&self, call_id: &str) {
        self.sessions.close(call_id).await;
    }

    // ---- transcript turns ----

    fn handle_transcript(
        &self,
        session: &CallSession,
        text: &str,
    ) -> Result<SpokenResponse, DialogueError> {
        match session.phase() {
            CallPhase::Greeting => {
                self.ensure_customer(session)?;
                session.transition_to(CallPhase::Identify)?;
                self.identify_turn(session, text)
            }
            CallPhase::Identify => self.identify_turn(session, text),
            CallPhase::Diagnose => self.diagnose_turn(session, text),
            CallPhase::Schedule => self.schedule_turn(session, text),
            CallPhase::Confirm => self.confirm_turn(session, text),
            CallPhase::Closed => Err(SessionError::SessionClosed(session.id.clone()).into()),
        }
    }

    fn identify_turn(
        &self,
        session: &CallSession,
        text: &str,
    ) -> Result<SpokenResponse, DialogueError> {
        match ApplianceCategory::scan(text) {
            Some(appliance) => {
                session.set_fact(FACT_APPLIANCE, appliance.as_str());
                session.transition_to(CallPhase::Diagnose)?;
                Ok(SpokenResponse::say(utterances::ask_problem(appliance)))
            }
            None => Ok(self.miss(session, utterances::ASK_APPLIANCE_AGAIN)),
        }
    }

    fn diagnose_turn(
        &self,
        session: &CallSession,
        text: &str,
    ) -> Result<SpokenResponse, DialogueError> {
        let turns = session.note_diagnose_turn();

        if is_resolved(text) {
            session.close();
            return Ok(SpokenResponse::hangup(utterances::GOODBYE_RESOLVED));
        }
        if wants_technician(text) {
            session.transition_to(CallPhase::Schedule)?;
            return Ok(SpokenResponse::say(utterances::ASK_ZIP));
        }
        if turns >= self.sessions.config().max_diagnose_turns {
            session.transition_to(CallPhase::Schedule)?;
            return Ok(SpokenResponse::fallback(
                utterances::DIAGNOSIS_EXHAUSTED,
                FallbackCategory::RetryAsk,
            ));
        }

        let Some(appliance) = self.session_appliance(session) else {
            session.transition_to(CallPhase::Identify)?;
            return Ok(SpokenResponse::say(utterances::ASK_APPLIANCE_AGAIN));
        };

        // The caller can correct the appliance mid-diagnosis.
        let appliance = match ApplianceCategory::scan(text) {
            Some(mentioned) if mentioned != appliance => {
                info!(call_id = %session.id, appliance = mentioned.as_str(), "appliance corrected");
                session.set_fact(FACT_APPLIANCE, mentioned.as_str());
                session.clear_fact(FACT_SYMPTOM);
                mentioned
            }
            _ => appliance,
        };

        match diagnostics::match_symptom(appliance, text) {
            Ok(matched) => {
                session.set_fact(FACT_SYMPTOM, matched.symptom);
                session.reset_failures();
                let tried: usize = session
                    .fact(FACT_STEPS_TRIED)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                if diagnostics::should_dispatch_technician(
                    tried,
                    false,
                    diagnostics::SymptomSeverity::Medium,
                ) {
                    session.transition_to(CallPhase::Schedule)?;
                    return Ok(SpokenResponse::say(format!(
                        "{} {}",
                        utterances::SUGGEST_TECHNICIAN,
                        utterances::ASK_ZIP
                    )));
                }
                session.set_fact(FACT_STEPS_TRIED, (tried + 1).to_string());
                let steps = diagnostics::troubleshooting_steps(appliance, matched.symptom);
                Ok(SpokenResponse::say(utterances::troubleshooting_reply(
                    matched.symptom,
                    steps,
                )))
            }
            Err(_) => Ok(self.miss(session, utterances::ASK_SYMPTOM_AGAIN)),
        }
    }

    fn schedule_turn(
        &self,
        session: &CallSession,
        text: &str,
    ) -> Result<SpokenResponse, DialogueError> {
        if let Some(choice) = parse_ordinal(text) {
            if let Some(offer) = self.offered_slot(session, choice) {
                session.set_fact(FACT_SELECTED_SLOT, offer.slot_id.to_string());
                session.transition_to(CallPhase::Confirm)?;
                return Ok(SpokenResponse::say(utterances::confirm_slot(&offer)));
            }
        }

        if let Some(zip) = scan_zip(text) {
            session.set_fact(FACT_ZIP, &zip);
            let Some(appliance) = self.session_appliance(session) else {
                session.transition_to(CallPhase::Closed).ok();
                return Ok(SpokenResponse::fallback(
                    utterances::APOLOGIZE_AND_END,
                    FallbackCategory::ApologizeAndEnd,
                ));
            };
            let mut query = SlotQuery::new(zip, appliance);
            query.day_part = scan_day_part(text);
            let offers = self.engine.find_availability(&query)?;
            return Ok(self.offer_or_give_up(session, offers));
        }

        let retry = if session.fact(FACT_OFFERED_SLOTS).is_some() {
            utterances::ASK_SLOT_AGAIN
        } else {
            utterances::ASK_ZIP
        };
        Ok(self.miss(session, retry))
    }

    fn confirm_turn(
        &self,
        session: &CallSession,
        text: &str,
    ) -> Result<SpokenResponse, DialogueError> {
        if is_affirmative(text) {
            let Some(slot_id) = session
                .fact(FACT_SELECTED_SLOT)
                .and_then(|s| s.parse::<i64>().ok())
            else {
                session.transition_to(CallPhase::Schedule)?;
                return Ok(SpokenResponse::fallback(
                    utterances::ASK_SLOT_AGAIN,
                    FallbackCategory::RetryAsk,
                ));
            };
            return self.book_and_respond(session, slot_id, None);
        }
        if is_negative(text) {
            session.transition_to(CallPhase::Schedule)?;
            let reply = match self.cached_offers(session) {
                Some(offers) if !offers.is_empty() => format!(
                    "{} {}",
                    utterances::CONFIRM_DECLINED,
                    utterances::offer_slots(&offers)
                ),
                _ => format!("{} {}", utterances::CONFIRM_DECLINED, utterances::ASK_ZIP),
            };
            return Ok(SpokenResponse::say(reply));
        }
        Ok(self.miss(session, utterances::ASK_SLOT_AGAIN))
    }

    // ---- tool turns ----

    async fn handle_tool(
        &self,
        session: &CallSession,
        name: &str,
        arguments: &Value,
    ) -> Result<SpokenResponse, DialogueError> {
        let call = match ToolCall::parse(name, arguments) {
            Ok(call) => call,
            // Bad tool calls count against the streak like any other miss.
            Err(e) => return Ok(self.tool_miss(session, name, &e)),
        };
        let phase = session.phase();
        if !call.permitted_in(phase) {
            // Rejected before any facts or phase state are touched.
            let e = DialogueError::InvalidToolCall {
                name: name.to_string(),
                phase,
            };
            return Ok(self.tool_miss(session, name, &e));
        }
        session.begin_tool_call(name)?;
        let result = self.execute_tool(session, call).await;
        session.finish_tool_call();
        result
    }

    async fn execute_tool(
        &self,
        session: &CallSession,
        call: ToolCall,
    ) -> Result<SpokenResponse, DialogueError> {
        match call {
            ToolCall::FetchSymptoms { appliance } => {
                session.set_fact(FACT_APPLIANCE, appliance.as_str());
                if session.phase() == CallPhase::Identify {
                    session.transition_to(CallPhase::Diagnose)?;
                }
                let symptoms = diagnostics::common_symptoms(appliance);
                Ok(SpokenResponse::say(utterances::symptom_menu(
                    appliance, symptoms,
                )))
            }
            ToolCall::FetchTroubleshooting { appliance, symptom } => {
                session.set_fact(FACT_APPLIANCE, appliance.as_str());
                session.set_fact(FACT_SYMPTOM, &symptom);
                let steps = diagnostics::troubleshooting_steps(appliance, &symptom);
                Ok(SpokenResponse::say(utterances::troubleshooting_reply(
                    &symptom, steps,
                )))
            }
            ToolCall::FetchAvailability {
                zip_code,
                appliance,
                start_date,
                end_date,
                day_part,
            } => {
                session.set_fact(FACT_ZIP, &zip_code);
                session.set_fact(FACT_APPLIANCE, appliance.as_str());
                let query = SlotQuery {
                    zip_code,
                    appliance,
                    start_date,
                    end_date,
                    day_part,
                };
                let offers = self.engine.find_availability(&query)?;
                Ok(self.offer_or_give_up(session, offers))
            }
            ToolCall::BookSlot {
                slot_id,
                issue_description,
            } => self.book_and_respond(session, slot_id, issue_description),
            ToolCall::CancelAppointment { confirmation_code } => {
                match self.engine.cancel_appointment(&confirmation_code) {
                    Ok(details) => Ok(SpokenResponse::say(utterances::cancelled(&details))),
                    Err(SchedulingError::AppointmentNotFound(code)) => {
                        Ok(SpokenResponse::fallback(
                            utterances::appointment_not_found(&code),
                            FallbackCategory::RetryAsk,
                        ))
                    }
                    Err(SchedulingError::AlreadyCancelled(code)) => {
                        Ok(SpokenResponse::say(utterances::already_cancelled(&code)))
                    }
                    Err(other) => Err(other.into()),
                }
            }
            ToolCall::RequestImageUpload { email } => {
                match self.send_upload_link(session, &email).await {
                    Ok(sent) => {
                        session.set_fact(FACT_UPLOAD_TOKEN, &sent.token);
                        Ok(SpokenResponse::say(utterances::upload_link_sent(&email)))
                    }
                    // Email trouble shouldn't end the diagnosis.
                    Err(DialogueError::UpstreamTimeout(_)) | Err(DialogueError::Collaborator(_)) => {
                        warn!(call_id = %session.id, "upload link could not be sent");
                        Ok(SpokenResponse::fallback(
                            utterances::EMAIL_TROUBLE,
                            FallbackCategory::RetryAsk,
                        ))
                    }
                    Err(other) => Err(other),
                }
            }
            ToolCall::UpdateCustomerInfo { update } => {
                let customer_id = self.ensure_customer(session)?;
                self.engine.update_customer(customer_id, &update)?;
                Ok(SpokenResponse::say(utterances::CUSTOMER_INFO_SAVED))
            }
        }
    }

    // ---- shared pieces ----

    async fn send_upload_link(
        &self,
        session: &CallSession,
        email: &str,
    ) -> Result<UploadToken, DialogueError> {
        let sent = tokio::time::timeout(
            COLLABORATOR_TIMEOUT,
            self.email.send_upload_link(email, &session.id),
        )
        .await
        .map_err(|_| DialogueError::UpstreamTimeout("email".to_string()))??;
        Ok(sent)
    }

    fn ensure_customer(&self, session: &CallSession) -> Result<i64, DialogueError> {
        if let Some(id) = session.customer_id() {
            return Ok(id);
        }
        let customer = self.engine.get_or_create_customer(&session.caller_phone)?;
        session.set_customer_id(customer.id);
        Ok(customer.id)
    }

    fn session_appliance(&self, session: &CallSession) -> Option<ApplianceCategory> {
        session
            .fact(FACT_APPLIANCE)
            .and_then(|raw| ApplianceCategory::normalize(&raw))
    }

    /// A rejected tool call. The caller hears the retry prompt for the
    /// current phase, and the failure streak advances just as it does
    /// for an unintelligible transcript.
    fn tool_miss(
        &self,
        session: &CallSession,
        name: &str,
        error: &DialogueError,
    ) -> SpokenResponse {
        warn!(call_id = %session.id, tool = name, error = %error, "tool call rejected");
        let retry = match session.phase() {
            CallPhase::Greeting | CallPhase::Identify => utterances::ASK_APPLIANCE_AGAIN,
            CallPhase::Diagnose => utterances::ASK_SYMPTOM_AGAIN,
            CallPhase::Schedule | CallPhase::Confirm => {
                if session.fact(FACT_OFFERED_SLOTS).is_some() {
                    utterances::ASK_SLOT_AGAIN
                } else {
                    utterances::ASK_ZIP
                }
            }
            CallPhase::Closed => utterances::APOLOGIZE_AND_END,
        };
        self.miss(session, retry)
    }

    /// A failed turn. Retry until the streak hits the threshold, then
    /// offer a human callback instead of looping forever.
    fn miss(&self, session: &CallSession, retry_prompt: &str) -> SpokenResponse {
        let streak = session.record_failure();
        if streak >= self.sessions.config().failure_threshold {
            SpokenResponse::fallback(utterances::OFFER_CALLBACK, FallbackCategory::OfferCallback)
        } else {
            SpokenResponse::fallback(retry_prompt, FallbackCategory::RetryAsk)
        }
    }

    fn offer_or_give_up(&self, session: &CallSession, offers: Vec<SlotOffer>) -> SpokenResponse {
        if offers.is_empty() {
            return SpokenResponse::fallback(
                utterances::NO_SLOTS,
                FallbackCategory::OfferCallback,
            );
        }
        let shortlist: Vec<SlotOffer> = offers
            .into_iter()
            .take(self.engine.config().max_offered_slots)
            .collect();
        self.remember_offers(session, &shortlist);
        session.reset_failures();
        SpokenResponse::say(utterances::offer_slots(&shortlist))
    }

    fn remember_offers(&self, session: &CallSession, offers: &[SlotOffer]) {
        if let Ok(encoded) = serde_json::to_string(offers) {
            session.set_fact(FACT_OFFERED_SLOTS, encoded);
        }
    }

    fn cached_offers(&self, session: &CallSession) -> Option<Vec<SlotOffer>> {
        let raw = session.fact(FACT_OFFERED_SLOTS)?;
        serde_json::from_str(&raw).ok()
    }

    fn offered_slot(&self, session: &CallSession, choice: usize) -> Option<SlotOffer> {
        self.cached_offers(session)?.into_iter().nth(choice - 1)
    }

    /// Book the slot and speak the outcome. A lost race falls back to
    /// fresh alternatives rather than an error.
    fn book_and_respond(
        &self,
        session: &CallSession,
        slot_id: i64,
        issue_description: Option<String>,
    ) -> Result<SpokenResponse, DialogueError> {
        let customer_id = self.ensure_customer(session)?;
        let Some(appliance) = self.session_appliance(session) else {
            return Ok(self.miss(session, utterances::ASK_APPLIANCE_AGAIN));
        };
        let symptom = session.fact(FACT_SYMPTOM);
        let request = BookingRequest {
            customer_id,
            slot_id,
            appliance,
            issue_description: issue_description
                .or_else(|| symptom.clone())
                .unwrap_or_else(|| "general service visit".to_string()),
            symptoms: symptom,
            call_id: Some(session.id.clone()),
        };

        match self.engine.book_slot(&request) {
            Ok(appointment) => {
                let details = self
                    .engine
                    .appointment_by_confirmation(&appointment.confirmation_code)?;
                session.close();
                Ok(SpokenResponse::hangup(utterances::booked(&details)))
            }
            Err(SchedulingError::SlotNoLongerAvailable(_))
            | Err(SchedulingError::SlotNotFound(_)) => {
                if session.phase() == CallPhase::Confirm {
                    session.transition_to(CallPhase::Schedule)?;
                }
                session.clear_fact(FACT_SELECTED_SLOT);
                let offers = match (session.fact(FACT_ZIP), self.session_appliance(session)) {
                    (Some(zip), Some(appliance)) => {
                        let query = SlotQuery::new(zip, appliance);
                        self.engine.find_availability(&query)?
                    }
                    _ => Vec::new(),
                };
                if offers.is_empty() {
                    return Ok(SpokenResponse::fallback(
                        utterances::NO_SLOTS,
                        FallbackCategory::OfferCallback,
                    ));
                }
                let shortlist: Vec<SlotOffer> = offers
                    .into_iter()
                    .take(self.engine.config().max_offered_slots)
                    .collect();
                self.remember_offers(session, &shortlist);
                Ok(SpokenResponse::fallback(
                    utterances::alternative_slots(&shortlist),
                    FallbackCategory::OfferAlternativeSlot,
                ))
            }
            Err(SchedulingError::ConfirmationGenerationExhausted(_)) => {
                session.close();
                Ok(SpokenResponse::fallback(
                    utterances::APOLOGIZE_AND_END,
                    FallbackCategory::ApologizeAndEnd,
                ))
            }
            Err(other) => Err(other.into()),
        }
    }
}

// ---- transcript heuristics ----

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn scan_zip(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|run| run.len() == 5)
        .map(str::to_string)
}

fn scan_day_part(text: &str) -> Option<DayPart> {
    words(text).iter().find_map(|w| DayPart::parse(w))
}

fn parse_ordinal(text: &str) -> Option<usize> {
    for w in words(text) {
        match w.as_str() {
            "first" | "1" | "one" => return Some(1),
            "second" | "2" | "two" => return Some(2),
            "third" | "3" | "three" => return Some(3),
            _ => {}
        }
    }
    None
}

fn is_affirmative(text: &str) -> bool {
    let lowered = text.to_lowercase();
    words(text).iter().any(|w| {
        matches!(
            w.as_str(),
            "yes" | "yeah" | "yep" | "correct" | "sure" | "confirm"
        )
    }) || lowered.contains("book it")
        || lowered.contains("sounds good")
        || lowered.contains("that works")
}

fn is_negative(text: &str) -> bool {
    words(text).iter().any(|w| {
        matches!(
            w.as_str(),
            "no" | "nope" | "nah" | "different" | "another" | "neither"
        )
    })
}

fn is_resolved(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("fixed")
        || lowered.contains("solved")
        || lowered.contains("resolved")
        || lowered.contains("working now")
        || lowered.contains("that worked")
        || lowered.contains("that did it")
}

fn wants_technician(text: &str) -> bool {
    words(text).iter().any(|w| {
        matches!(
            w.as_str(),
            "technician" | "tech" | "appointment" | "schedule" | "book" | "someone" | "visit"
        )
    }) || is_negative(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StubUploadService;
    use chrono::{Duration as ChronoDuration, Local, NaiveTime};
    use homeserv_config::{SchedulingConfig, SessionConfig};
    use homeserv_scheduling::{MemoryStore, SchedulingStore, Technician, TimeSlot};
    use serde_json::json;

    fn seeded_orchestrator(slot_count: usize) -> (DialogueOrchestrator, Vec<i64>) {
        seeded_orchestrator_with(slot_count, SessionConfig::default())
    }

    fn seeded_orchestrator_with(
        slot_count: usize,
        session_config: SessionConfig,
    ) -> (DialogueOrchestrator, Vec<i64>) {
        let store = Arc::new(MemoryStore::new());
        let tech = store
            .insert_technician(&Technician {
                id: 0,
                first_name: "Nina".into(),
                last_name: "Patel".into(),
                employee_id: "TECH011".into(),
                email: "npatel@homeserv.example".into(),
                phone: "555-101-0011".into(),
                years_experience: 13,
                is_active: true,
                specialties: vec![ApplianceCategory::Refrigerator],
                service_areas: vec!["10001".into()],
            })
            .unwrap();
        let mut slot_ids = Vec::new();
        for i in 0..slot_count {
            let slot = store
                .insert_slot(&TimeSlot {
                    id: 0,
                    technician_id: tech.id,
                    date: Local::now().date_naive() + ChronoDuration::days(2 + i as i64),
                    start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                    is_available: true,
                })
                .unwrap();
            slot_ids.push(slot.id);
        }
        let engine = SchedulingEngine::new(
            store as Arc<dyn SchedulingStore>,
            SchedulingConfig::default(),
        );
        let sessions = Arc::new(SessionManager::new(session_config));
        let uploads = Arc::new(StubUploadService::new());
        let orchestrator =
            DialogueOrchestrator::new(sessions, engine, uploads.clone(), uploads);
        (orchestrator, slot_ids)
    }

    fn transcript(text: &str) -> TurnIntent {
        TurnIntent::Transcript {
            text: text.to_string(),
        }
    }

    async fn drive_to_confirm(orchestrator: &DialogueOrchestrator) {
        orchestrator
            .begin_call("call-1", "555-123-4567")
            .await
            .unwrap();
        orchestrator
            .handle_turn("call-1", transcript("my fridge is broken"))
            .await
            .unwrap();
        orchestrator
            .handle_turn("call-1", transcript("it's not cooling at all"))
            .await
            .unwrap();
        orchestrator
            .handle_turn("call-1", transcript("no, please send a technician"))
            .await
            .unwrap();
        let offers = orchestrator
            .handle_turn("call-1", transcript("my zip is 10001"))
            .await
            .unwrap();
        assert!(offers.text.contains("option 1"));
        let confirm = orchestrator
            .handle_turn("call-1", transcript("the first one"))
            .await
            .unwrap();
        assert!(confirm.text.contains("Shall I book it"));
    }

    #[tokio::test]
    async fn happy_path_books_and_closes() {
        let (orchestrator, _slots) = seeded_orchestrator(2);
        drive_to_confirm(&orchestrator).await;

        let booked = orchestrator
            .handle_turn("call-1", transcript("yes please"))
            .await
            .unwrap();
        assert!(booked.end_call);
        assert!(booked.text.contains("SHS-"));

        // The call is over; further turns are rejected.
        let err = orchestrator
            .handle_turn("call-1", transcript("hello?"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DialogueError::Session(SessionError::SessionClosed(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_call_rejected() {
        let (orchestrator, _slots) = seeded_orchestrator(1);
        orchestrator
            .begin_call("call-1", "555-123-4567")
            .await
            .unwrap();
        let err = orchestrator
            .begin_call("call-1", "555-123-4567")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DialogueError::Session(SessionError::DuplicateSession(_))
        ));
    }

    #[tokio::test]
    async fn third_miss_offers_callback() {
        let (orchestrator, _slots) = seeded_orchestrator(1);
        orchestrator
            .begin_call("call-1", "555-123-4567")
            .await
            .unwrap();
        orchestrator
            .handle_turn("call-1", transcript("the refrigerator"))
            .await
            .unwrap();

        let first = orchestrator
            .handle_turn("call-1", transcript("it glows purple"))
            .await
            .unwrap();
        assert_eq!(first.fallback, Some(FallbackCategory::RetryAsk));
        let second = orchestrator
            .handle_turn("call-1", transcript("it glows purple"))
            .await
            .unwrap();
        assert_eq!(second.fallback, Some(FallbackCategory::RetryAsk));
        let third = orchestrator
            .handle_turn("call-1", transcript("it glows purple"))
            .await
            .unwrap();
        assert_eq!(third.fallback, Some(FallbackCategory::OfferCallback));
        assert!(!third.end_call);
    }

    #[tokio::test]
    async fn successful_turn_resets_streak() {
        let (orchestrator, _slots) = seeded_orchestrator(1);
        orchestrator
            .begin_call("call-1", "555-123-4567")
            .await
            .unwrap();
        orchestrator
            .handle_turn("call-1", transcript("the refrigerator"))
            .await
            .unwrap();

        for _ in 0..2 {
            orchestrator
                .handle_turn("call-1", transcript("it glows purple"))
                .await
                .unwrap();
        }
        // A recognized symptom clears the streak before the third miss.
        orchestrator
            .handle_turn("call-1", transcript("it's not cooling"))
            .await
            .unwrap();
        let next_miss = orchestrator
            .handle_turn("call-1", transcript("it glows purple"))
            .await
            .unwrap();
        assert_eq!(next_miss.fallback, Some(FallbackCategory::RetryAsk));
    }

    #[tokio::test]
    async fn invalid_tool_call_rejected_without_side_effects() {
        let (orchestrator, slots) = seeded_orchestrator(1);
        orchestrator
            .begin_call("call-1", "555-123-4567")
            .await
            .unwrap();
        orchestrator
            .handle_turn("call-1", transcript("my dishwasher smells bad"))
            .await
            .unwrap();

        let session = orchestrator.sessions().get("call-1").unwrap();
        let facts_before = session.snapshot().facts;
        assert_eq!(session.phase(), CallPhase::Diagnose);

        let reply = orchestrator
            .handle_turn(
                "call-1",
                TurnIntent::ToolCall {
                    name: "book_slot".to_string(),
                    arguments: json!({ "slot_id": slots[0] }),
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.fallback, Some(FallbackCategory::RetryAsk));

        // Phase and facts are untouched, the slot is still free, but the
        // miss landed on the streak.
        assert_eq!(session.phase(), CallPhase::Diagnose);
        assert_eq!(session.snapshot().facts, facts_before);
        assert_eq!(session.failure_streak(), 1);

        // The call carries on normally afterwards.
        let reply = orchestrator
            .handle_turn("call-1", transcript("please send a technician"))
            .await
            .unwrap();
        assert!(reply.text.contains("zip code"));
        assert_eq!(session.phase(), CallPhase::Schedule);
    }

    #[tokio::test]
    async fn repeated_tool_failures_escalate_to_callback() {
        let (orchestrator, slots) = seeded_orchestrator(1);
        orchestrator
            .begin_call("call-1", "555-123-4567")
            .await
            .unwrap();
        orchestrator
            .handle_turn("call-1", transcript("my fridge is broken"))
            .await
            .unwrap();

        // Out-of-phase, unknown, and malformed tool calls all count
        // toward the same streak a garbled transcript would.
        let bad_turns = [
            TurnIntent::ToolCall {
                name: "book_slot".to_string(),
                arguments: json!({ "slot_id": slots[0] }),
            },
            TurnIntent::ToolCall {
                name: "launch_rocket".to_string(),
                arguments: json!({}),
            },
            TurnIntent::ToolCall {
                name: "request_image_upload".to_string(),
                arguments: json!({ "email": "not-an-address" }),
            },
        ];
        let mut fallbacks = Vec::new();
        for intent in bad_turns {
            let reply = orchestrator.handle_turn("call-1", intent).await.unwrap();
            fallbacks.push(reply.fallback);
        }
        assert_eq!(
            fallbacks,
            vec![
                Some(FallbackCategory::RetryAsk),
                Some(FallbackCategory::RetryAsk),
                Some(FallbackCategory::OfferCallback),
            ]
        );
    }

    #[tokio::test]
    async fn exhausted_diagnosis_forces_scheduling_with_a_handoff() {
        let (orchestrator, _slots) = seeded_orchestrator_with(
            1,
            SessionConfig {
                max_diagnose_turns: 2,
                ..SessionConfig::default()
            },
        );
        orchestrator
            .begin_call("call-1", "555-123-4567")
            .await
            .unwrap();
        orchestrator
            .handle_turn("call-1", transcript("my fridge is broken"))
            .await
            .unwrap();
        orchestrator
            .handle_turn("call-1", transcript("it glows purple"))
            .await
            .unwrap();

        // The turn that hits the cap acknowledges the handoff instead of
        // jumping straight to the zip question.
        let reply = orchestrator
            .handle_turn("call-1", transcript("it still glows purple"))
            .await
            .unwrap();
        assert_eq!(reply.fallback, Some(FallbackCategory::RetryAsk));
        assert!(reply.text.contains("technician"));
        assert!(reply.text.contains("zip code"));
        let session = orchestrator.sessions().get("call-1").unwrap();
        assert_eq!(session.phase(), CallPhase::Schedule);
    }

    #[tokio::test]
    async fn declining_confirmation_returns_to_schedule() {
        let (orchestrator, _slots) = seeded_orchestrator(2);
        drive_to_confirm(&orchestrator).await;

        let reply = orchestrator
            .handle_turn("call-1", transcript("no, a different time"))
            .await
            .unwrap();
        assert!(reply.text.contains("option 1"));
        let session = orchestrator.sessions().get("call-1").unwrap();
        assert_eq!(session.phase(), CallPhase::Schedule);
    }

    #[tokio::test]
    async fn lost_slot_race_offers_alternatives() {
        let (orchestrator, slots) = seeded_orchestrator(2);
        drive_to_confirm(&orchestrator).await;

        // Another caller books the chosen slot out from under this one.
        let engine = &orchestrator.engine;
        let rival = engine.get_or_create_customer("555-999-0000").unwrap();
        engine
            .book_slot(&BookingRequest {
                customer_id: rival.id,
                slot_id: slots[0],
                appliance: ApplianceCategory::Refrigerator,
                issue_description: "not cooling".into(),
                symptoms: None,
                call_id: None,
            })
            .unwrap();

        let reply = orchestrator
            .handle_turn("call-1", transcript("yes"))
            .await
            .unwrap();
        assert_eq!(reply.fallback, Some(FallbackCategory::OfferAlternativeSlot));
        assert!(!reply.end_call);

        let session = orchestrator.sessions().get("call-1").unwrap();
        assert_eq!(session.phase(), CallPhase::Schedule);

        // The remaining slot can still be taken to finish the call.
        let booked = orchestrator
            .handle_turn("call-1", transcript("the first one works"))
            .await
            .unwrap();
        assert!(booked.text.contains("Shall I book it"));
        let done = orchestrator
            .handle_turn("call-1", transcript("yes"))
            .await
            .unwrap();
        assert!(done.end_call);
    }

    #[tokio::test]
    async fn cancel_tool_round_trip() {
        let (orchestrator, slots) = seeded_orchestrator(1);
        orchestrator
            .begin_call("call-1", "555-123-4567")
            .await
            .unwrap();
        orchestrator
            .handle_turn("call-1", transcript("fridge not cooling"))
            .await
            .unwrap();

        // Book directly through the engine to get a code to cancel.
        let customer = orchestrator
            .engine
            .get_or_create_customer("555-123-4567")
            .unwrap();
        let appointment = orchestrator
            .engine
            .book_slot(&BookingRequest {
                customer_id: customer.id,
                slot_id: slots[0],
                appliance: ApplianceCategory::Refrigerator,
                issue_description: "not cooling".into(),
                symptoms: None,
                call_id: None,
            })
            .unwrap();

        let reply = orchestrator
            .handle_turn(
                "call-1",
                TurnIntent::ToolCall {
                    name: "cancel_appointment".to_string(),
                    arguments: json!({ "confirmation_code": appointment.confirmation_code }),
                },
            )
            .await
            .unwrap();
        assert!(reply.text.contains("cancelled"));

        // Cancelling again is reported, not retried.
        let again = orchestrator
            .handle_turn(
                "call-1",
                TurnIntent::ToolCall {
                    name: "cancel_appointment".to_string(),
                    arguments: json!({ "confirmation_code": appointment.confirmation_code }),
                },
            )
            .await
            .unwrap();
        assert!(again.text.contains("already cancelled"));
    }

    #[tokio::test]
    async fn image_upload_tool_in_diagnose() {
        let (orchestrator, _slots) = seeded_orchestrator(1);
        orchestrator
            .begin_call("call-1", "555-123-4567")
            .await
            .unwrap();
        orchestrator
            .handle_turn("call-1", transcript("my fridge is broken"))
            .await
            .unwrap();

        let reply = orchestrator
            .handle_turn(
                "call-1",
                TurnIntent::ToolCall {
                    name: "request_image_upload".to_string(),
                    arguments: json!({ "email": "caller@example.com" }),
                },
            )
            .await
            .unwrap();
        assert!(reply.text.contains("caller@example.com"));

        let session = orchestrator.sessions().get("call-1").unwrap();
        assert!(session.snapshot().facts.contains_key("upload_token"));

        // The stub answers on the next turn; the summary lands in facts.
        orchestrator
            .handle_turn("call-1", transcript("it's making a loud noise"))
            .await
            .unwrap();
        let facts = session.snapshot().facts;
        assert!(facts.contains_key("image_summary"));
        assert!(!facts.contains_key("upload_token"));
    }

    #[test]
    fn heuristics() {
        assert_eq!(scan_zip("it's 10001, in manhattan"), Some("10001".into()));
        assert_eq!(scan_zip("extension 1234567"), None);
        assert_eq!(parse_ordinal("I'll take the second one"), Some(2));
        assert!(is_affirmative("yes, book it"));
        assert!(is_negative("no, that doesn't work"));
        assert!(is_resolved("great, it's working now"));
        assert!(!is_resolved("it's still not draining"));
        assert!(wants_technician("just send someone out"));
        assert_eq!(scan_day_part("morning would be best"), Some(DayPart::Morning));
    }
}
