mod pipeline_tests;
mod resumable_parsing_tests;
