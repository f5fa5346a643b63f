use chrono::{Local, Timelike};
use rand::seq::SliceRandom;

const ANYTIME: &[&str] = &[
    "Thanks for calling, this is {name}. How can I help?",
    "Hello, you've reached {name}. What can I do for you?",
    "Hi, {name} speaking. How can I help you today?",
];

const MORNING: &[&str] = &[
    "Good morning, thanks for calling. This is {name}.",
    "Morning! You've reached {name}. How can I help?",
];

const AFTERNOON: &[&str] = &[
    "Good afternoon, this is {name}. How can I help?",
    "Afternoon! {name} here. What can I do for you?",
];

const EVENING: &[&str] = &[
    "Good evening, you've reached {name}. How can I help?",
    "Evening! This is {name}. What can I do for you?",
];

fn time_pool(hour: u32) -> &'static [&'static str] {
    match hour {
        5..=11 => MORNING,
        12..=16 => AFTERNOON,
        17..=21 => EVENING,
        _ => ANYTIME,
    }
}

/// Pick a greeting for a persona with no configured greeting text.
///
/// Combines the anytime pool with the time-of-day pool and substitutes the
/// persona's display name.
pub fn select_greeting(name: &str) -> String {
    let hour = Local::now().hour();
    select_greeting_for_hour(name, hour)
}

fn select_greeting_for_hour(name: &str, hour: u32) -> String {
    let time_specific = time_pool(hour);
    let mut pool: Vec<&str> = Vec::with_capacity(ANYTIME.len() + time_specific.len());
    pool.extend_from_slice(ANYTIME);
    pool.extend_from_slice(time_specific);

    let mut rng = rand::thread_rng();
    let template = pool.choose(&mut rng).unwrap_or(&ANYTIME[0]);
    template.replace("{name}", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_contains_persona_name() {
        let greeting = select_greeting_for_hour("Sales Assistant", 10);
        assert!(
            greeting.contains("Sales Assistant"),
            "greeting should contain persona name: {greeting}"
        );
    }

    #[test]
    fn greeting_no_placeholder_leftover() {
        for hour in 0..24 {
            let greeting = select_greeting_for_hour("Desk", hour);
            assert!(
                !greeting.contains("{name}"),
                "placeholder not replaced at hour {hour}: {greeting}"
            );
        }
    }

    #[test]
    fn greeting_never_empty() {
        for hour in 0..24 {
            assert!(!select_greeting_for_hour("X", hour).is_empty());
        }
    }

    #[test]
    fn time_pool_boundaries() {
        assert_eq!(time_pool(4), ANYTIME);
        assert_eq!(time_pool(5), MORNING);
        assert_eq!(time_pool(11), MORNING);
        assert_eq!(time_pool(12), AFTERNOON);
        assert_eq!(time_pool(16), AFTERNOON);
        assert_eq!(time_pool(17), EVENING);
        assert_eq!(time_pool(21), EVENING);
        assert_eq!(time_pool(22), ANYTIME);
    }
}
