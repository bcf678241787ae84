pub mod dead_letter_message;
