//! End-to-end tests: artifacts on disk through the HTTP surface.
