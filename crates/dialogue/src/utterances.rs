//! Everything the agent says, in one place.

use homeserv_core::ApplianceCategory;
use homeserv_scheduling::{AppointmentDetails, SlotOffer};

pub const GREETING: &str =
    "Thanks for calling home services. Which appliance can I help you with today?";

pub const ASK_APPLIANCE_AGAIN: &str =
    "Sorry, I didn't catch which appliance that is. Is it something like a washer, refrigerator, or oven?";

pub const ASK_SYMPTOM_AGAIN: &str =
    "I want to make sure I understand the problem. Can you describe what the appliance is doing, in a few words?";

pub const ASK_ZIP: &str =
    "Let's get a technician out to you. What's the 5-digit zip code for the service address?";

pub const ASK_SLOT_AGAIN: &str =
    "Which of those times works for you? You can say first, second, or third.";

pub const OFFER_CALLBACK: &str =
    "I'm having trouble understanding. I can have a team member call you back instead. Someone will reach out within one business day.";

pub const NO_SLOTS: &str =
    "I'm sorry, I don't see any open appointments in your area right now. I can have our scheduling team call you back to find a time.";

pub const APOLOGIZE_AND_END: &str =
    "I'm sorry, something went wrong on our end and I can't finish this booking right now. Please call back in a few minutes.";

pub const GOODBYE_RESOLVED: &str =
    "Glad that fixed it. Thanks for calling, and have a great day.";

pub const CONFIRM_DECLINED: &str = "No problem. Let's find a different time.";

pub const EMAIL_TROUBLE: &str =
    "I wasn't able to send that email just now. We can try again in a moment, or just continue without the photo.";

pub const SUGGEST_TECHNICIAN: &str =
    "We've tried the usual fixes, so this one really needs a technician to look at it.";

pub const DIAGNOSIS_EXHAUSTED: &str =
    "We've spent a while on this without luck, so let's get a technician out to take a look instead. What's the 5-digit zip code for the service address?";

pub fn ask_problem(appliance: ApplianceCategory) -> String {
    format!(
        "Sorry to hear about your {}. What seems to be the problem?",
        appliance.display_name()
    )
}

pub fn troubleshooting_reply(symptom: &str, steps: &[&str]) -> String {
    let tried: Vec<&str> = steps.iter().take(2).copied().collect();
    format!(
        "It sounds like the issue is: {symptom}. Let's try a couple of things. {} Did either of those help?",
        tried
            .iter()
            .map(|s| format!("{s}."))
            .collect::<Vec<_>>()
            .join(" ")
    )
}

pub fn symptom_menu(appliance: ApplianceCategory, symptoms: &[&str]) -> String {
    format!(
        "Common problems with a {} include: {}. Which sounds closest?",
        appliance.display_name(),
        symptoms.join(", ")
    )
}

pub fn offer_slots(offers: &[SlotOffer]) -> String {
    let spoken: Vec<String> = offers
        .iter()
        .enumerate()
        .map(|(i, o)| format!("option {}: {}", i + 1, o.spoken()))
        .collect();
    format!(
        "I found some openings. {}. Which would you like?",
        spoken.join(". ")
    )
}

pub fn alternative_slots(offers: &[SlotOffer]) -> String {
    format!(
        "I'm sorry, that time was just taken. {}",
        offer_slots(offers)
    )
}

pub fn confirm_slot(offer: &SlotOffer) -> String {
    format!(
        "Just to confirm: a technician visit on {}. Shall I book it?",
        offer.spoken()
    )
}

pub fn booked(details: &AppointmentDetails) -> String {
    format!(
        "You're all set: {}. We'll see you then. Goodbye!",
        details.spoken()
    )
}

pub fn cancelled(details: &AppointmentDetails) -> String {
    format!(
        "Your appointment with confirmation code {} is cancelled, and that time slot is open again. Anything else?",
        details.appointment.confirmation_code
    )
}

pub fn upload_link_sent(email: &str) -> String {
    format!(
        "I've emailed an upload link to {email}. It's good for 24 hours; a photo of the appliance helps the technician arrive prepared."
    )
}

pub const CUSTOMER_INFO_SAVED: &str = "Got it, I've updated your contact details.";

pub fn appointment_not_found(code: &str) -> String {
    format!("I couldn't find an appointment with confirmation code {code}. Could you read it again?")
}

pub fn already_cancelled(code: &str) -> String {
    format!("The appointment with code {code} is already cancelled, so there's nothing more to do.")
}
