pub mod session_kv;
