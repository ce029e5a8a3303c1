pub mod job_repository;
pub mod llm_provider;
pub mod site_crawler;
pub mod time_service;
