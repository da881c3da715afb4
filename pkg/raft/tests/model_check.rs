//! Model-checks the core safety property of leader election — "at most one leader per term" —
//! against a small abstract model of the election sub-protocol (§4.3 election/vote rules), rather
//! than driving the async `ConsensusNode` directly: `stateright` explores a synchronous state
//! graph, so the model re-expresses the same term/vote/majority rules as a pure state machine.

use std::collections::HashSet;

use stateright::{Checker, Model, Property};

const SERVER_COUNT: usize = 3;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
enum Role {
    Follower,
    Candidate,
    Leader,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct ElectionState {
    current_term: [u64; SERVER_COUNT],
    role: [Role; SERVER_COUNT],
    voted_for: [Option<usize>; SERVER_COUNT],
    votes_received: [HashSet<usize>; SERVER_COUNT],
}

#[derive(Clone, Debug)]
enum Action {
    Timeout(usize),
    RequestVote { candidate: usize, voter: usize },
}

struct ElectionModel;

fn majority(n: usize) -> usize {
    n / 2 + 1
}

impl Model for ElectionModel {
    type State = ElectionState;
    type Action = Action;

    fn init_states(&self) -> Vec<Self::State> {
        vec![ElectionState {
            current_term: [0; SERVER_COUNT],
            role: [Role::Follower, Role::Follower, Role::Follower],
            voted_for: [None; SERVER_COUNT],
            votes_received: Default::default(),
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for server in 0..SERVER_COUNT {
            if !matches!(state.role[server], Role::Leader) {
                actions.push(Action::Timeout(server));
            }
        }
        for candidate in 0..SERVER_COUNT {
            if matches!(state.role[candidate], Role::Candidate) {
                for voter in 0..SERVER_COUNT {
                    if voter != candidate {
                        actions.push(Action::RequestVote { candidate, voter });
                    }
                }
            }
        }
    }

    fn next_state(&self, last_state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut state = last_state.clone();

        match action {
            Action::Timeout(server) => {
                state.current_term[server] += 1;
                state.role[server] = Role::Candidate;
                state.voted_for[server] = Some(server);
                state.votes_received[server] = HashSet::from([server]);
            }
            Action::RequestVote { candidate, voter } => {
                let candidate_term = state.current_term[candidate];

                // Receiver rule: adopt a higher term and step down before deciding the vote.
                if candidate_term > state.current_term[voter] {
                    state.current_term[voter] = candidate_term;
                    state.role[voter] = Role::Follower;
                    state.voted_for[voter] = None;
                }

                if candidate_term < state.current_term[voter] {
                    return Some(state); // stale request-vote: ignored, no grant
                }

                let can_vote = matches!(state.voted_for[voter], None) || state.voted_for[voter] == Some(candidate);
                if can_vote {
                    state.voted_for[voter] = Some(candidate);
                    if matches!(state.role[candidate], Role::Candidate) && state.current_term[candidate] == candidate_term {
                        state.votes_received[candidate].insert(voter);
                        if state.votes_received[candidate].len() >= majority(SERVER_COUNT) {
                            state.role[candidate] = Role::Leader;
                        }
                    }
                }
            }
        }

        Some(state)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![Property::always("at most one leader per term", |_model, state| {
            for term in 0..=*state.current_term.iter().max().unwrap_or(&0) {
                let leaders_in_term = (0..SERVER_COUNT)
                    .filter(|&i| matches!(state.role[i], Role::Leader) && state.current_term[i] == term)
                    .count();
                if leaders_in_term > 1 {
                    return false;
                }
            }
            true
        })]
    }
}

#[test]
fn at_most_one_leader_per_term() {
    ElectionModel
        .checker()
        .spawn_bfs()
        .join()
        .assert_properties();
}
