use abook_core::{CommandId, PersonId, PersonInput};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::actors::random_input;

/// One user or environment action.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Add,
    Edit { target: PersonId },
    Delete { target: PersonId },
    Cancel { command: CommandId },
    OverrideEdit { command: CommandId, input: PersonInput },
    OverrideDelete { command: CommandId },
    Retry { command: CommandId },
    Sync,
    /// Let virtual time pass.
    Advance { millis: u64 },
}

/// What the generator may pick targets from.
#[derive(Debug, Default)]
pub struct OpContext {
    pub persons: Vec<PersonId>,
    pub in_flight: Vec<CommandId>,
    pub retryable: Vec<CommandId>,
}

fn advance(rng: &mut ChaCha8Rng) -> Op {
    Op::Advance {
        millis: rng.gen_range(100..=2500),
    }
}

/// Pick a random operation. Anything that needs a target it cannot find
/// degrades to letting time pass.
pub fn generate(rng: &mut ChaCha8Rng, cx: &OpContext) -> Op {
    let roll = rng.gen_range(0..100);
    let person = cx.persons.choose(rng).cloned();
    let command = cx.in_flight.choose(rng).copied();
    match (roll, person, command) {
        (0..=17, _, _) => Op::Add,
        (18..=33, Some(target), _) => Op::Edit { target },
        (34..=45, Some(target), _) => Op::Delete { target },
        (46..=55, _, Some(command)) => Op::Cancel { command },
        (56..=63, _, Some(command)) => Op::OverrideEdit {
            command,
            input: random_input(rng, 0.2),
        },
        (64..=69, _, Some(command)) => Op::OverrideDelete { command },
        (70..=74, _, _) => match cx.retryable.choose(rng) {
            Some(&command) => Op::Retry { command },
            None => advance(rng),
        },
        (75..=82, _, _) => Op::Sync,
        _ => advance(rng),
    }
}
