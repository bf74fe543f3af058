//! # run control
//!
//! Decides whether the machine advances automatically, once, or not at all.
//! The controller never touches the machine itself: every transition hands
//! back the list of actions the driver has to carry out, in order.
//!
//!  state    | event                 | next     | actions
//!  ---------+-----------------------+----------+-----------------------------
//!  Stopped  | PlayPauseToggled      | Running  | (refresh requested)
//!  Running  | PlayPauseToggled      | Stopped  | -
//!  Running  | RefreshFired          | Running  | Step (refresh requested)
//!  Stopped  | RefreshFired          | Stopped  | -
//!  Stopped  | SingleStepRequested   | Stopped  | Step
//!  Running  | SingleStepRequested   | Running  | -
//!  any      | RomSelected           | Stopped  | Reset, Render, FetchRom
//!  any      | ResetRequested        | same     | Reset (+ Render if enabled)
//!  any      | RomLoaded             | same     | LoadRom

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Stopped => write!(f, "stopped"),
            RunState::Running => write!(f, "running"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    PlayPauseToggled,
    RefreshFired,
    SingleStepRequested,
    RomSelected,
    ResetRequested,
    RomLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// tick the machine once, then render
    Step,
    Reset,
    Render,
    FetchRom,
    LoadRom,
}

const NOTHING: &[Action] = &[];
const STEP: &[Action] = &[Action::Step];
const SWAP_ROM: &[Action] = &[Action::Reset, Action::Render, Action::FetchRom];
const RESET: &[Action] = &[Action::Reset];
const RESET_AND_REDRAW: &[Action] = &[Action::Reset, Action::Render];
const LOAD_ROM: &[Action] = &[Action::LoadRom];

#[derive(Debug, Clone, Default)]
pub struct RunController {
    state: RunState,
    // at most one outstanding refresh request, however often play is toggled
    refresh_pending: bool,
    redraw_on_reset: bool,
}

impl RunController {
    pub fn new(redraw_on_reset: bool) -> Self {
        RunController {
            state: RunState::Stopped,
            refresh_pending: false,
            redraw_on_reset,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// true while a refresh callback has been asked for and not yet fired
    pub fn wants_refresh(&self) -> bool {
        self.refresh_pending
    }

    pub fn on(&mut self, event: Control) -> &'static [Action] {
        let actions = match (self.state, event) {
            (RunState::Stopped, Control::PlayPauseToggled) => {
                self.state = RunState::Running;
                self.refresh_pending = true;
                NOTHING
            }
            (RunState::Running, Control::PlayPauseToggled) => {
                // an outstanding refresh still fires, but finds us stopped
                self.state = RunState::Stopped;
                NOTHING
            }
            (RunState::Running, Control::RefreshFired) => {
                self.refresh_pending = true;
                STEP
            }
            (RunState::Stopped, Control::RefreshFired) => {
                self.refresh_pending = false;
                NOTHING
            }
            (RunState::Stopped, Control::SingleStepRequested) => STEP,
            (RunState::Running, Control::SingleStepRequested) => NOTHING,
            (_, Control::RomSelected) => {
                self.state = RunState::Stopped;
                SWAP_ROM
            }
            (_, Control::ResetRequested) => {
                if self.redraw_on_reset {
                    RESET_AND_REDRAW
                } else {
                    RESET
                }
            }
            (_, Control::RomLoaded) => LOAD_ROM,
        };
        log::debug!("{:?} -> {} {:?}", event, self.state, actions);
        actions
    }
}
