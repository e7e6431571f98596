pub mod helpers;
mod tests_state;
mod tests_tableset;
