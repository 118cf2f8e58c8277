//! Benchmark-only crate; the measurements live in `benches/`.
