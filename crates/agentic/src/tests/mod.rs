//! End-to-end tests of the orchestrator against scripted collaborators.

mod scenarios;
