//! Test suites for the gum pipe server.
