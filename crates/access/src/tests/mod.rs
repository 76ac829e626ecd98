mod helpers;

mod direct_tests;
mod registry_tests;
