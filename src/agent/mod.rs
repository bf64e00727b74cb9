//! Response agent: turns a classified customer message into a reply.

pub mod prompts;
mod responder;

pub use responder::{
    AI_DISCLAIMER, FALLBACK_RESPONSE, NO_DATE_RESPONSE, ResponseAgent, voice_instruction,
};
