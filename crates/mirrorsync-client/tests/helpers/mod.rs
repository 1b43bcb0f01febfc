pub mod mock_repository;
pub mod test_data;
