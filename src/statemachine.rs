//! The IEEE 1149.1 TAP controller state graph.  Both link encodings walk the same graph; this
//! module only knows which TMS value moves the controller from one state to the next and how to
//! find the shortest TMS sequence between two states.
use alloc::vec::Vec;
use alloc::vec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

use JtagState::*;

static STATES: [JtagState; 16] = [
    Reset, Idle,
    SelectDR, CaptureDR, ShiftDR, Exit1DR, PauseDR, Exit2DR, UpdateDR,
    SelectIR, CaptureIR, ShiftIR, Exit1IR, PauseIR, Exit2IR, UpdateIR,
];

// Successor for TMS low / TMS high, indexed by state
const EDGES: [[JtagState; 2]; 16] = [
    [Idle, Reset],
    [Idle, SelectDR],
    [CaptureDR, SelectIR],
    [ShiftDR, Exit1DR],
    [ShiftDR, Exit1DR],
    [PauseDR, UpdateDR],
    [PauseDR, Exit2DR],
    [ShiftDR, UpdateDR],
    [Idle, SelectDR],
    [CaptureIR, Reset],
    [ShiftIR, Exit1IR],
    [ShiftIR, Exit1IR],
    [PauseIR, UpdateIR],
    [PauseIR, Exit2IR],
    [ShiftIR, UpdateIR],
    [Idle, SelectDR],
];

impl JtagState {
    /// The state reached after one TCK edge with the given TMS level
    pub fn next(self, tms: bool) -> JtagState {
        EDGES[self as usize][tms as usize]
    }

    /// Shortest TMS sequence leading from `self` to `target`.  Empty if already there.
    pub fn path_to(self, target: JtagState) -> Vec<bool> {
        if self == target {
            return Vec::new();
        }

        // Breadth-first over the 16 states; `via[s]` remembers how we first reached s
        let mut via: [Option<(JtagState, bool)>; 16] = [None; 16];
        let mut frontier = vec![self];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for state in frontier {
                for tms in [false, true] {
                    let to = state.next(tms);
                    if to == self || via[to as usize].is_some() {
                        continue;
                    }
                    via[to as usize] = Some((state, tms));
                    if to == target {
                        return Self::unwind(&via, self, target);
                    }
                    next.push(to);
                }
            }
            frontier = next;
        }
        // The graph is strongly connected, every target is reachable
        unreachable!()
    }

    fn unwind(via: &[Option<(JtagState, bool)>; 16], from: JtagState, to: JtagState) -> Vec<bool> {
        let mut path = Vec::new();
        let mut at = to;
        while at != from {
            let Some((prev, tms)) = via[at as usize] else { break };
            path.push(tms);
            at = prev;
        }
        path.reverse();
        path
    }

    /// Whether the controller shifts a register in this state
    pub fn is_shift(self) -> bool {
        matches!(self, ShiftDR | ShiftIR)
    }
}

/// All sixteen states, in numeric order
pub fn states() -> &'static [JtagState] {
    &STATES
}
