pub mod streaks;
