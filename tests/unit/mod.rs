mod admission_tests;
mod telemetry_tests;
