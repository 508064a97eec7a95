//! Notification text catalogs
//!
//! Every outward notice picks one of a few phrasings at random so the bot
//! does not repeat itself word for word.

use rand::seq::SliceRandom;

pub const ACK: &[&str] = &[
    "Roger, will find a teammate to take this on",
    "Hang tight, looking for someone for your request",
    "Okey-dokey, one volunteer for your request coming up",
];

pub const CALL_TO_ACTION: &[&str] = &[
    "Are you up for it?",
    "Can you take this one?",
    "Ready to jump in?",
];

pub const TIMEOUT: &[&str] = &[
    "You took too long to respond, so the request moved on to someone else",
    "You appear to be busy. That's ok, passing the request along",
    "No answer in time; offering this one to another teammate",
];

pub const NOT_ENOUGH_RECIPIENTS: &[&str] = &[
    "I could not find enough available recipients for your request",
    "It's quiet here; there aren't enough people around to ask",
    "Where did everyone go? Not enough recipients for your request",
];

pub const ABORT: &[&str] = &[
    "I have to give up on this request; there is nobody left to ask",
    "Everyone either declined or never answered. Maybe ask for something easier?",
    "My powers of persuasion failed me; nobody took the request",
];

pub const ACCEPT_THANKS: &[&str] = &[
    "Thank you, you're awesome!",
    "Knew I could count on you",
    "Thanks, we owe you one",
];

pub const REJECT_ACK: &[&str] = &[
    "That's ok, maybe next time. Thanks for responding",
    "Oh... you're probably busy... that's fine, maybe next time",
    "No worries, passing it along",
];

pub const EXPIRED_REQUESTER: &[&str] = &[
    "Your request expired before anyone could accept it, please try again",
    "Nobody got to your request in time and it has expired; give it another go",
];

pub const EXPIRED_RESPONDER: &[&str] = &[
    "This request expired before your response could be processed",
    "Too slow, sorry: the request already expired",
];

pub const TOO_LATE: &[&str] = &[
    "This request has already moved on to someone else",
    "Thanks, but that one is no longer yours to answer",
];

pub const DIRECTORY_ERROR: &[&str] = &[
    "Something went wrong while contacting the chat service, please try again later",
    "The chat service is not answering right now; retry in a bit",
];

/// Pick one phrasing at random.
pub fn pick<'a>(variants: &[&'a str]) -> &'a str {
    variants
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("")
}
