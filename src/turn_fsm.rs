use rust_fsm::*;

state_machine! {
    turn_flow(Idle)

    Idle(HydrateSubmitting) => Submitting,
    Idle(HydrateStreaming) => Streaming,

    Idle(Submit) => Submitting,

    Submitting(FirstChunk) => Streaming,
    Submitting(Complete) => Idle,
    Submitting(Fail) => Idle,

    Streaming(Chunk) => Streaming,
    Streaming(Complete) => Idle,
    Streaming(Cancel) => Idle,
    Streaming(Fail) => Idle
}

/// Lifecycle of a single turn. `Idle` also covers "finished with an error";
/// the error itself lives on the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Submitting,
    Streaming,
}

impl TurnPhase {
    pub fn in_flight(self) -> bool {
        matches!(self, TurnPhase::Submitting | TurnPhase::Streaming)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnEvent {
    Submit,
    FirstChunk,
    Chunk,
    Complete,
    Cancel,
    Fail,
}

fn hydrate(machine: &mut turn_flow::StateMachine, phase: TurnPhase) -> Result<(), ()> {
    let input = match phase {
        TurnPhase::Idle => return Ok(()),
        TurnPhase::Submitting => turn_flow::Input::HydrateSubmitting,
        TurnPhase::Streaming => turn_flow::Input::HydrateStreaming,
    };
    machine.consume(&input).map_err(|_| ())?;
    Ok(())
}

fn expected_next_phase(current: TurnPhase, event: TurnEvent) -> Option<TurnPhase> {
    match (current, event) {
        (TurnPhase::Idle, TurnEvent::Submit) => Some(TurnPhase::Submitting),
        (TurnPhase::Submitting, TurnEvent::FirstChunk) => Some(TurnPhase::Streaming),
        (TurnPhase::Submitting, TurnEvent::Complete | TurnEvent::Fail) => Some(TurnPhase::Idle),
        (TurnPhase::Streaming, TurnEvent::Chunk) => Some(TurnPhase::Streaming),
        (TurnPhase::Streaming, TurnEvent::Complete | TurnEvent::Cancel | TurnEvent::Fail) => {
            Some(TurnPhase::Idle)
        }
        _ => None,
    }
}

/// Returns the phase after `event`, or `None` when the event is not allowed
/// in `current`.
pub fn transition(current: TurnPhase, event: TurnEvent) -> Option<TurnPhase> {
    let mut machine = turn_flow::StateMachine::new();
    hydrate(&mut machine, current).ok()?;

    let input = match event {
        TurnEvent::Submit => turn_flow::Input::Submit,
        TurnEvent::FirstChunk => turn_flow::Input::FirstChunk,
        TurnEvent::Chunk => turn_flow::Input::Chunk,
        TurnEvent::Complete => turn_flow::Input::Complete,
        TurnEvent::Cancel => turn_flow::Input::Cancel,
        TurnEvent::Fail => turn_flow::Input::Fail,
    };

    machine.consume(&input).ok()?;
    expected_next_phase(current, event)
}
