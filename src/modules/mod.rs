pub mod esxi;
pub mod honeypot;
pub mod web_fuzzer;
